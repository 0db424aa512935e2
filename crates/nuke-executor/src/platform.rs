//! Target platform naming for release archives.

use std::env;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, Result};

/// Operating systems the cleanup tool publishes archives for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Os {
    Linux,
    Darwin,
}

impl Os {
    pub fn current() -> Result<Self> {
        match env::consts::OS {
            "linux" => Ok(Os::Linux),
            "macos" => Ok(Os::Darwin),
            other => Err(ExecutorError::InvalidConfig(format!(
                "unsupported operating system: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Darwin => "darwin",
        }
    }
}

/// CPU architectures, named the way release archives name them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Amd64,
    Arm64,
}

impl Arch {
    pub fn current() -> Result<Self> {
        match env::consts::ARCH {
            "x86_64" => Ok(Arch::Amd64),
            "aarch64" => Ok(Arch::Arm64),
            other => Err(ExecutorError::InvalidConfig(format!(
                "unsupported architecture: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Amd64 => "amd64",
            Arch::Arm64 => "arm64",
        }
    }
}

/// OS + architecture pair, rendered as `linux-amd64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetPlatform {
    pub os: Os,
    pub arch: Arch,
}

impl TargetPlatform {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }

    /// Detect the host platform.
    pub fn current() -> Result<Self> {
        Ok(Self::new(Os::current()?, Arch::current()?))
    }
}

impl fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os.as_str(), self.arch.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_naming() {
        assert_eq!(
            TargetPlatform::new(Os::Linux, Arch::Amd64).to_string(),
            "linux-amd64"
        );
        assert_eq!(
            TargetPlatform::new(Os::Darwin, Arch::Arm64).to_string(),
            "darwin-arm64"
        );
    }

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    #[test]
    fn test_current_on_linux_amd64() {
        assert_eq!(TargetPlatform::current().unwrap().to_string(), "linux-amd64");
    }
}
