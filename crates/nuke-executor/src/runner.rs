//! Bounded execution of the cleanup tool.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::acquire::BinaryHandle;
use crate::error::Result;
use crate::obs;

/// How long to keep draining pipes after the child has exited or been killed.
const DEFAULT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Result of one cleanup run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Exit code; `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,

    /// Captured stdout (partial when timed out).
    pub stdout: String,

    /// Captured stderr (partial when timed out).
    pub stderr: String,

    /// Wall-clock time from spawn to exit or kill.
    pub elapsed: Duration,

    /// Whether the wall-clock limit was hit and the process killed.
    pub timed_out: bool,
}

impl ExecutionResult {
    /// Exit code 0 is the only success signal.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// stdout followed by stderr.
    pub fn combined_output(&self) -> String {
        let mut combined = String::with_capacity(self.stdout.len() + self.stderr.len());
        combined.push_str(&self.stdout);
        combined.push_str(&self.stderr);
        combined
    }
}

/// Runs the cleanup tool under a hard wall-clock limit.
pub struct ProcessRunner {
    timeout: Duration,
    drain_grace: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            drain_grace: DEFAULT_DRAIN_GRACE,
        }
    }

    pub fn with_drain_grace(mut self, grace: Duration) -> Self {
        self.drain_grace = grace;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Argument vector for one run.
    ///
    /// Dry-run is the default: committing deletions needs the extra
    /// `--no-dry-run` flag.
    pub fn build_args(policy_path: &Path, dry_run: bool) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "--config".to_string(),
            policy_path.to_string_lossy().into_owned(),
            "--no-prompt".to_string(),
        ];
        if !dry_run {
            args.push("--no-dry-run".to_string());
        }
        args
    }

    /// Run `binary` against `policy_path`.
    ///
    /// A nonzero exit or a timeout is reported in the returned
    /// `ExecutionResult`; only a failure to spawn or wait is an `Err`.
    pub async fn run(
        &self,
        binary: &BinaryHandle,
        policy_path: &Path,
        dry_run: bool,
    ) -> Result<ExecutionResult> {
        let args = Self::build_args(policy_path, dry_run);
        info!(
            binary = %binary.path().display(),
            args = %args.join(" "),
            mode = if dry_run { "dry-run" } else { "execution" },
            timeout_secs = self.timeout.as_secs(),
            "executing cleanup tool"
        );
        self.run_command(binary.path(), &args).await
    }

    pub(crate) async fn run_command(&self, program: &Path, args: &[String]) -> Result<ExecutionResult> {
        let start = Instant::now();

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout takes down the tool's children too.
        #[cfg(unix)]
        command.process_group(0);
        let mut child = command.spawn()?;
        let pid = child.id();

        let stdout_buf = Arc::new(Mutex::new(Vec::new()));
        let stderr_buf = Arc::new(Mutex::new(Vec::new()));
        let stdout_task = drain(child.stdout.take(), stdout_buf.clone());
        let stderr_task = drain(child.stderr.take(), stderr_buf.clone());

        let (exit_code, timed_out) = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => (status?.code(), false),
            Err(_) => {
                warn!(
                    timeout_secs = self.timeout.as_secs_f64(),
                    "cleanup tool exceeded its wall-clock limit, killing it"
                );
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "failed to kill timed-out process");
                }
                (None, true)
            }
        };
        let elapsed = start.elapsed();

        tokio::join!(
            self.finish_drain(stdout_task),
            self.finish_drain(stderr_task)
        );

        let stdout = String::from_utf8_lossy(&stdout_buf.lock().await).into_owned();
        let stderr = String::from_utf8_lossy(&stderr_buf.lock().await).into_owned();

        obs::emit_process_finished(exit_code, elapsed.as_millis() as u64, timed_out);

        Ok(ExecutionResult {
            exit_code,
            stdout,
            stderr,
            elapsed,
            timed_out,
        })
    }

    /// Wait for a drain task, abandoning it after the grace period.
    ///
    /// Whatever the task buffered so far stays in its buffer either way.
    async fn finish_drain(&self, task: JoinHandle<()>) {
        let abort = task.abort_handle();
        if tokio::time::timeout(self.drain_grace, task).await.is_err() {
            warn!("output pipe still open after grace period, keeping buffered output");
            abort.abort();
        }
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return;
    };
    // SAFETY: killpg only sends a signal; the group was created at spawn.
    if unsafe { libc::killpg(pid, libc::SIGKILL) } != 0 {
        warn!(
            pid,
            error = %std::io::Error::last_os_error(),
            "failed to kill process group"
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

/// Copy `reader` into `sink` chunk by chunk until EOF or error.
fn drain<R>(reader: Option<R>, sink: Arc<Mutex<Vec<u8>>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(mut reader) = reader else {
            return;
        };
        let mut chunk = [0u8; 8192];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_dry_run_args_have_no_commit_flag() {
        let args = ProcessRunner::build_args(Path::new("/tmp/nuke-config.yaml"), true);
        assert_eq!(
            args,
            vec!["run", "--config", "/tmp/nuke-config.yaml", "--no-prompt"]
        );
    }

    #[test]
    fn test_real_run_adds_commit_flag() {
        let args = ProcessRunner::build_args(Path::new("/tmp/nuke-config.yaml"), false);
        assert_eq!(args.last().map(String::as_str), Some("--no-dry-run"));
        assert_eq!(args.len(), 5);
    }

    #[test]
    fn test_execution_result_success() {
        let result = ExecutionResult {
            exit_code: Some(0),
            stdout: "a\n".to_string(),
            stderr: "b\n".to_string(),
            elapsed: Duration::from_millis(10),
            timed_out: false,
        };
        assert!(result.success());
        assert_eq!(result.combined_output(), "a\nb\n");

        let failed = ExecutionResult {
            exit_code: Some(1),
            ..result.clone()
        };
        assert!(!failed.success());

        let killed = ExecutionResult {
            exit_code: None,
            timed_out: true,
            ..result
        };
        assert!(!killed.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_captures_both_streams() {
        let runner = ProcessRunner::new(Duration::from_secs(10));
        let args = vec!["-c".to_string(), "echo out; echo err >&2; exit 4".to_string()];
        let result = runner
            .run_command(&PathBuf::from("/bin/sh"), &args)
            .await
            .unwrap();

        assert_eq!(result.exit_code, Some(4));
        assert_eq!(result.stdout, "out\n");
        assert_eq!(result.stderr, "err\n");
        assert!(!result.timed_out);
    }

    #[tokio::test]
    async fn test_run_command_missing_program_is_error() {
        let runner = ProcessRunner::new(Duration::from_secs(1));
        let result = runner
            .run_command(&PathBuf::from("/definitely/not/here"), &[])
            .await;
        assert!(result.is_err());
    }
}
