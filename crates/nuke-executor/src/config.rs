//! Executor configuration.
//!
//! Defaults match the hosted deployment (GitHub releases of `aws-nuke`,
//! scratch in the system temp dir, 870 s execution budget under a 900 s
//! host ceiling). Every knob can be overridden from `NUKE_*` environment
//! variables or CLI flags.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ExecutorError, Result};
use crate::platform::TargetPlatform;

pub const DEFAULT_TOOL_NAME: &str = "aws-nuke";
pub const DEFAULT_TOOL_VERSION: &str = "v3.56.2";
pub const DEFAULT_REGISTRY_URL: &str =
    "https://api.github.com/repos/ekristen/aws-nuke/releases/latest";
pub const DEFAULT_DOWNLOAD_URL_TEMPLATE: &str =
    "https://github.com/ekristen/aws-nuke/releases/download/{version}/aws-nuke-{version}-{platform}.tar.gz";
pub const DEFAULT_OUTPUT_PREFIX: &str = "nuke-outputs";

/// Configuration for one execution environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutorConfig {
    /// Name of the cleanup tool; also the canonical binary file name.
    pub tool_name: String,

    /// Scratch space owned by this execution environment.
    pub scratch_dir: PathBuf,

    /// Endpoint returning the latest release as JSON (`tag_name`).
    pub registry_url: String,

    /// Archive URL with `{version}` and `{platform}` placeholders.
    pub download_url_template: String,

    /// Platform override (`linux-amd64`); detected from the host when unset.
    pub platform: Option<String>,

    /// Version used when the request does not name one.
    pub default_tool_version: String,

    /// Bucket for outputs; defaults to the policy document's bucket.
    pub output_bucket: Option<String>,

    /// Key prefix for persisted outputs.
    pub output_prefix: String,

    /// Release registry lookup timeout in seconds.
    pub registry_timeout_secs: u64,

    /// Archive download timeout in seconds.
    pub download_timeout_secs: u64,

    /// `--version` probe timeout in seconds.
    pub probe_timeout_secs: u64,

    /// Hard wall-clock limit for the cleanup run in seconds.
    pub execution_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            tool_name: DEFAULT_TOOL_NAME.to_string(),
            scratch_dir: std::env::temp_dir(),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            download_url_template: DEFAULT_DOWNLOAD_URL_TEMPLATE.to_string(),
            platform: None,
            default_tool_version: DEFAULT_TOOL_VERSION.to_string(),
            output_bucket: None,
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
            registry_timeout_secs: 5,
            download_timeout_secs: 60,
            probe_timeout_secs: 10,
            execution_timeout_secs: 870,
        }
    }
}

impl ExecutorConfig {
    /// Defaults overlaid with `NUKE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = lookup("NUKE_SCRATCH_DIR") {
            config.scratch_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("NUKE_TOOL_NAME") {
            config.tool_name = v;
        }
        if let Some(v) = lookup("NUKE_REGISTRY_URL") {
            config.registry_url = v;
        }
        if let Some(v) = lookup("NUKE_DOWNLOAD_URL_TEMPLATE") {
            config.download_url_template = v;
        }
        if let Some(v) = lookup("NUKE_PLATFORM") {
            config.platform = Some(v);
        }
        if let Some(v) = lookup("NUKE_DEFAULT_VERSION") {
            config.default_tool_version = v;
        }
        if let Some(v) = lookup("NUKE_OUTPUT_BUCKET") {
            config.output_bucket = Some(v);
        }
        if let Some(v) = lookup("NUKE_OUTPUT_PREFIX") {
            config.output_prefix = v;
        }
        if let Some(v) = lookup("NUKE_EXECUTION_TIMEOUT_SECS") {
            config.execution_timeout_secs = v.trim().parse().map_err(|_| {
                ExecutorError::InvalidConfig(format!(
                    "NUKE_EXECUTION_TIMEOUT_SECS must be a whole number of seconds, got {v:?}"
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a working invocation.
    pub fn validate(&self) -> Result<()> {
        if self.tool_name.trim().is_empty() {
            return Err(ExecutorError::InvalidConfig("tool name is empty".into()));
        }
        if !self.download_url_template.contains("{version}") {
            return Err(ExecutorError::InvalidConfig(format!(
                "download URL template has no {{version}} placeholder: {}",
                self.download_url_template
            )));
        }
        if self.execution_timeout_secs == 0 {
            return Err(ExecutorError::InvalidConfig(
                "execution timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    /// Platform string used in archive names.
    pub fn target_platform(&self) -> Result<String> {
        match &self.platform {
            Some(p) => Ok(p.clone()),
            None => Ok(TargetPlatform::current()?.to_string()),
        }
    }

    /// Deterministic archive URL for `version` on `platform`.
    pub fn download_url(&self, version: &str, platform: &str) -> String {
        self.download_url_template
            .replace("{version}", version)
            .replace("{platform}", platform)
    }

    /// Where the verified binary lives in scratch space.
    pub fn canonical_binary_path(&self) -> PathBuf {
        self.scratch_dir.join(&self.tool_name)
    }

    /// Where the downloaded archive is saved.
    pub fn archive_path(&self) -> PathBuf {
        self.scratch_dir.join(format!("{}.tar.gz", self.tool_name))
    }

    /// Where the staged policy document is written.
    pub fn policy_path(&self) -> PathBuf {
        self.scratch_dir.join("nuke-config.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ExecutorConfig::default();
        assert_eq!(config.tool_name, "aws-nuke");
        assert_eq!(config.registry_timeout(), Duration::from_secs(5));
        assert_eq!(config.download_timeout(), Duration::from_secs(60));
        assert_eq!(config.probe_timeout(), Duration::from_secs(10));
        assert_eq!(config.execution_timeout(), Duration::from_secs(870));
        assert!(config.execution_timeout() < Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_download_url_is_deterministic() {
        let config = ExecutorConfig::default();
        assert_eq!(
            config.download_url("v3.0.0", "linux-amd64"),
            "https://github.com/ekristen/aws-nuke/releases/download/v3.0.0/aws-nuke-v3.0.0-linux-amd64.tar.gz"
        );
    }

    #[test]
    fn test_scratch_paths() {
        let config = ExecutorConfig {
            scratch_dir: PathBuf::from("/scratch"),
            ..ExecutorConfig::default()
        };
        assert_eq!(config.canonical_binary_path(), PathBuf::from("/scratch/aws-nuke"));
        assert_eq!(config.archive_path(), PathBuf::from("/scratch/aws-nuke.tar.gz"));
        assert_eq!(config.policy_path(), PathBuf::from("/scratch/nuke-config.yaml"));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ExecutorConfig::from_lookup(lookup_from(&[
            ("NUKE_SCRATCH_DIR", "/work"),
            ("NUKE_PLATFORM", "linux-arm64"),
            ("NUKE_OUTPUT_BUCKET", "results"),
            ("NUKE_EXECUTION_TIMEOUT_SECS", "120"),
        ]))
        .unwrap();

        assert_eq!(config.scratch_dir, PathBuf::from("/work"));
        assert_eq!(config.target_platform().unwrap(), "linux-arm64");
        assert_eq!(config.output_bucket.as_deref(), Some("results"));
        assert_eq!(config.execution_timeout_secs, 120);
    }

    #[test]
    fn test_from_lookup_rejects_bad_timeout() {
        let err = ExecutorConfig::from_lookup(lookup_from(&[(
            "NUKE_EXECUTION_TIMEOUT_SECS",
            "soon",
        )]))
        .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidConfig(_)));
    }

    #[test]
    fn test_validate_rejects_zero_timeout_and_bad_template() {
        let config = ExecutorConfig {
            execution_timeout_secs: 0,
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = ExecutorConfig {
            download_url_template: "https://example.com/latest.tar.gz".into(),
            ..ExecutorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
