//! Invocation state machine.
//!
//! `Start -> Acquire -> Execute -> Classify -> Persist -> Done`, with a
//! failure exit from every stage. Both exits produce a `ResultEnvelope`;
//! nothing is raised past [`Orchestrator::execute`].

use std::path::PathBuf;
use std::sync::Arc;

use nuke_state::{ObjectLocation, ObjectStore};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::acquire::BinaryAcquirer;
use crate::classify::classify;
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, Result};
use crate::obs;
use crate::registry::{ArtifactFetcher, GithubReleases, ReleaseRegistry};
use crate::reporter::{Outcome, ReportContext, ResultReporter};
use crate::request::{ExecutionRequest, ResultEnvelope};
use crate::runner::ProcessRunner;
use crate::version::VersionPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Acquire,
    Execute,
    Classify,
    Persist,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Acquire => "acquire",
            Stage::Execute => "execute",
            Stage::Classify => "classify",
            Stage::Persist => "persist",
            Stage::Done => "done",
        }
    }
}

/// Why an invocation left the happy path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailReason {
    DownloadFailure,
    ProcessTimeout,
    Unhandled,
}

impl FailReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailReason::DownloadFailure => "download_failure",
            FailReason::ProcessTimeout => "process_timeout",
            FailReason::Unhandled => "unhandled",
        }
    }
}

/// Sequences acquisition, execution, classification and persistence for
/// one execution environment.
pub struct Orchestrator {
    config: ExecutorConfig,
    store: Arc<dyn ObjectStore>,
    acquirer: BinaryAcquirer,
    runner: ProcessRunner,
}

impl Orchestrator {
    pub fn new(
        config: ExecutorConfig,
        store: Arc<dyn ObjectStore>,
        registry: Arc<dyn ReleaseRegistry>,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        let acquirer = BinaryAcquirer::new(config.clone(), registry, fetcher);
        let runner = ProcessRunner::new(config.execution_timeout());
        Self {
            config,
            store,
            acquirer,
            runner,
        }
    }

    /// Orchestrator talking to the configured release registry over HTTP.
    pub fn with_http(config: ExecutorConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let github = Arc::new(GithubReleases::new(config.registry_url.clone())?);
        Ok(Self::new(config, store, github.clone(), github))
    }

    /// Run one invocation to a terminal envelope.
    pub async fn execute(&self, request: &ExecutionRequest) -> ResultEnvelope {
        let invocation_id = Uuid::new_v4().to_string();
        let span = obs::invocation_span(&invocation_id, &request.account_id);
        self.run_stages(request).instrument(span).await
    }

    async fn run_stages(&self, request: &ExecutionRequest) -> ResultEnvelope {
        obs::emit_stage_entered(Stage::Start.as_str());
        info!(
            policy = %request.policy_uri,
            mode = request.mode(),
            version = %request.tool_version,
            enforce_version = request.enforce_version,
            "starting cleanup invocation"
        );

        let reporter = ResultReporter::new(self.store.clone(), self.report_context(request));

        let policy_path = match self.stage_policy(&request.policy_uri).await {
            Ok(path) => path,
            Err(err) => {
                return fail(&reporter, Stage::Start, FailReason::Unhandled, Outcome::Failed(err))
                    .await
            }
        };

        obs::emit_stage_entered(Stage::Acquire.as_str());
        let policy = VersionPolicy::new(request.tool_version.clone(), request.enforce_version);
        let binary = match self.acquirer.acquire(&policy).await {
            Ok(binary) => binary,
            Err(err) => {
                return fail(
                    &reporter,
                    Stage::Acquire,
                    FailReason::DownloadFailure,
                    Outcome::AcquisitionFailed(err),
                )
                .await
            }
        };

        obs::emit_stage_entered(Stage::Execute.as_str());
        let result = match self.runner.run(&binary, &policy_path, request.dry_run).await {
            Ok(result) => result,
            Err(err) => {
                return fail(&reporter, Stage::Execute, FailReason::Unhandled, Outcome::Failed(err))
                    .await
            }
        };
        if result.timed_out {
            let outcome = Outcome::TimedOut {
                limit: self.runner.timeout(),
                partial_output: result.combined_output(),
            };
            return fail(&reporter, Stage::Execute, FailReason::ProcessTimeout, outcome).await;
        }

        obs::emit_stage_entered(Stage::Classify.as_str());
        let classified = classify(&result.combined_output(), request.dry_run);

        obs::emit_stage_entered(Stage::Persist.as_str());
        let envelope = reporter
            .report(Outcome::Completed { result, classified })
            .await;

        obs::emit_stage_entered(Stage::Done.as_str());
        envelope
    }

    /// Output bucket: configured override, else the policy document's bucket.
    fn report_context(&self, request: &ExecutionRequest) -> ReportContext {
        let bucket = self
            .config
            .output_bucket
            .clone()
            .or_else(|| {
                ObjectLocation::parse(&request.policy_uri)
                    .ok()
                    .map(|loc| loc.bucket)
            })
            .unwrap_or_default();

        ReportContext {
            bucket,
            prefix: self.config.output_prefix.clone(),
            account_id: request.account_id.clone(),
            dry_run: request.dry_run,
            send_notification: request.send_notification,
        }
    }

    /// Copy the policy document into scratch space and return its local path.
    async fn stage_policy(&self, policy_uri: &str) -> Result<PathBuf> {
        let location = ObjectLocation::parse(policy_uri)
            .map_err(|e| ExecutorError::PolicyUnavailable(e.to_string()))?;
        let body = self
            .store
            .get(&location)
            .await
            .map_err(|e| ExecutorError::PolicyUnavailable(e.to_string()))?;

        fs::create_dir_all(&self.config.scratch_dir).await?;
        let path = self.config.policy_path();
        fs::write(&path, &body).await?;
        info!(uri = %location, path = %path.display(), bytes = body.len(), "policy document staged");
        Ok(path)
    }
}

async fn fail(
    reporter: &ResultReporter,
    stage: Stage,
    reason: FailReason,
    outcome: Outcome,
) -> ResultEnvelope {
    match &outcome {
        Outcome::AcquisitionFailed(err) | Outcome::Failed(err) => {
            obs::emit_failure(stage.as_str(), reason.as_str(), err)
        }
        Outcome::TimedOut { limit, .. } => obs::emit_failure(
            stage.as_str(),
            reason.as_str(),
            &ExecutorError::ProcessTimeout { limit: *limit },
        ),
        Outcome::Completed { .. } => {}
    }
    reporter.report(outcome).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{MemoryFetcher, StaticRegistry};
    use nuke_state::fakes::MemoryObjectStore;

    fn orchestrator(
        scratch: &std::path::Path,
        store: Arc<MemoryObjectStore>,
        output_bucket: Option<&str>,
    ) -> Orchestrator {
        let config = ExecutorConfig {
            scratch_dir: scratch.to_path_buf(),
            platform: Some("linux-amd64".into()),
            output_bucket: output_bucket.map(str::to_string),
            ..ExecutorConfig::default()
        };
        Orchestrator::new(
            config,
            store,
            Arc::new(StaticRegistry::failing("offline")),
            Arc::new(MemoryFetcher::new()),
        )
    }

    #[test]
    fn test_output_bucket_defaults_to_policy_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), Arc::new(MemoryObjectStore::new()), None);
        let request = ExecutionRequest::new("s3://policies/acct/nuke.yaml", "1");
        assert_eq!(orch.report_context(&request).bucket, "policies");

        let orch = orchestrator(dir.path(), Arc::new(MemoryObjectStore::new()), Some("results"));
        assert_eq!(orch.report_context(&request).bucket, "results");
    }

    #[tokio::test]
    async fn test_stage_policy_writes_scratch_copy() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryObjectStore::new());
        store
            .put(
                &ObjectLocation::new("policies", "acct/nuke.yaml"),
                b"regions: [us-east-1]\n",
                "application/x-yaml",
            )
            .await
            .unwrap();
        let orch = orchestrator(dir.path(), store, None);

        let path = orch.stage_policy("s3://policies/acct/nuke.yaml").await.unwrap();

        assert_eq!(path, dir.path().join("nuke-config.yaml"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "regions: [us-east-1]\n");
    }

    #[tokio::test]
    async fn test_stage_policy_rejects_bad_uri() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(dir.path(), Arc::new(MemoryObjectStore::new()), None);
        let err = orch.stage_policy("https://example.com/x.yaml").await.unwrap_err();
        assert!(matches!(err, ExecutorError::PolicyUnavailable(_)));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(Stage::Acquire.as_str(), "acquire");
        assert_eq!(FailReason::ProcessTimeout.as_str(), "process_timeout");
    }
}
