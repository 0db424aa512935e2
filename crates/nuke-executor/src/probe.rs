//! `--version` smoke test for a candidate binary.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::error::{ExecutorError, Result};

/// Run `<binary> --version` and return its trimmed output.
///
/// Fails if the binary cannot be spawned, does not finish within `timeout`,
/// or exits unsuccessfully.
pub async fn probe_version(binary: &Path, timeout: Duration) -> Result<String> {
    let failed = |reason: String| ExecutorError::ProbeFailed {
        path: binary.to_path_buf(),
        reason,
    };

    let child = Command::new(binary)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failed(format!("spawn failed: {e}")))?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| failed(format!("no answer within {} seconds", crate::error::secs(&timeout))))?
        .map_err(|e| failed(e.to_string()))?;

    if !output.status.success() {
        return Err(failed(format!("exited with {}", output.status)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let info = if stdout.is_empty() {
        String::from_utf8_lossy(&output.stderr).trim().to_string()
    } else {
        stdout
    };
    debug!(binary = %binary.display(), version = %info, "version probe passed");
    Ok(info)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_probe_reads_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "tool", "echo 'aws-nuke version v3.0.0'");
        let info = probe_version(&bin, Duration::from_secs(10)).await.unwrap();
        assert_eq!(info, "aws-nuke version v3.0.0");
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "tool", "echo 'v3.0.0' >&2");
        let info = probe_version(&bin, Duration::from_secs(10)).await.unwrap();
        assert_eq!(info, "v3.0.0");
    }

    #[tokio::test]
    async fn test_probe_rejects_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "tool", "exit 3");
        let err = probe_version(&bin, Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, ExecutorError::ProbeFailed { .. }));
    }

    #[tokio::test]
    async fn test_probe_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let bin = script(dir.path(), "tool", "exec sleep 30");
        let err = probe_version(&bin, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no answer within"));
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let err = probe_version(&dir.path().join("absent"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("spawn failed"));
    }
}
