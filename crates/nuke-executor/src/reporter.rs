//! Persists run output and assembles the result envelope.
//!
//! Every outcome writes at least one object: the full output (plus the
//! filtered view) for completed runs, an error document otherwise. A failed
//! upload never aborts reporting; the envelope carries the intended URI
//! annotated with `(upload failed)` instead.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nuke_state::{ObjectLocation, ObjectStore, PRESIGN_TTL};
use tracing::{debug, info, warn};

use crate::classify::ClassifiedOutput;
use crate::error::ExecutorError;
use crate::obs;
use crate::request::{bounded, ResultEnvelope, MAX_ERROR_LEN, MAX_OUTPUT_PREVIEW_LEN};
use crate::runner::ExecutionResult;

/// Body written when a run kept no lines.
pub const EMPTY_FILTERED_PLACEHOLDER: &str = "No filtered output available";

const CONTENT_TYPE: &str = "text/plain";
const UPLOAD_FAILED_MARKER: &str = "(upload failed)";

/// Where and for whom results are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportContext {
    pub bucket: String,
    pub prefix: String,
    pub account_id: String,
    pub dry_run: bool,
    pub send_notification: bool,
}

impl ReportContext {
    pub fn mode(&self) -> &'static str {
        if self.dry_run {
            "dryrun"
        } else {
            "execution"
        }
    }
}

/// How an invocation ended, as seen by the reporter.
#[derive(Debug)]
pub enum Outcome {
    /// The tool ran to completion, with any exit code.
    Completed {
        result: ExecutionResult,
        classified: ClassifiedOutput,
    },
    /// No verified binary could be obtained.
    AcquisitionFailed(ExecutorError),
    /// The wall-clock limit was hit; `partial_output` is what was captured.
    TimedOut {
        limit: Duration,
        partial_output: String,
    },
    /// Anything else.
    Failed(ExecutorError),
}

/// Error document plus the fields derived from it.
struct ErrorReport {
    error: String,
    document: String,
    qualifier: String,
}

pub struct ResultReporter {
    store: Arc<dyn ObjectStore>,
    ctx: ReportContext,
}

impl ResultReporter {
    pub fn new(store: Arc<dyn ObjectStore>, ctx: ReportContext) -> Self {
        Self { store, ctx }
    }

    pub async fn report(&self, outcome: Outcome) -> ResultEnvelope {
        self.report_at(outcome, Utc::now()).await
    }

    /// Like [`report`](Self::report) with a fixed timestamp for the keys.
    pub async fn report_at(&self, outcome: Outcome, at: DateTime<Utc>) -> ResultEnvelope {
        let envelope = match outcome {
            Outcome::Completed { result, classified } => {
                self.report_completed(&result, &classified, at).await
            }
            Outcome::AcquisitionFailed(err) => {
                let error = format!("failed to download cleanup tool: {err}");
                let document = format!(
                    "{error}\nThis may be due to network issues or release registry rate limiting.\n"
                );
                self.report_error(
                    ErrorReport {
                        error,
                        document,
                        qualifier: format!("download-failed-{}", self.ctx.mode()),
                    },
                    at,
                )
                .await
            }
            Outcome::TimedOut {
                limit,
                partial_output,
            } => {
                let error = ExecutorError::ProcessTimeout { limit }.to_string();
                let document = if partial_output.is_empty() {
                    format!("{error}\n\nNo partial output available")
                } else {
                    format!("{error}\n\nPartial output:\n{partial_output}")
                };
                self.report_error(
                    ErrorReport {
                        error,
                        document,
                        qualifier: format!("timeout-{}", self.ctx.mode()),
                    },
                    at,
                )
                .await
            }
            Outcome::Failed(err) => {
                let error = err.to_string();
                let document = format!("cleanup run failed with error:\n{error}\n\n");
                self.report_error(
                    ErrorReport {
                        error,
                        document,
                        qualifier: format!("exception-{}", self.ctx.mode()),
                    },
                    at,
                )
                .await
            }
        };

        obs::emit_envelope_ready(
            envelope.success,
            envelope.resources_to_delete,
            &envelope.output_uri,
        );
        envelope
    }

    async fn report_completed(
        &self,
        result: &ExecutionResult,
        classified: &ClassifiedOutput,
        at: DateTime<Utc>,
    ) -> ResultEnvelope {
        let mode = self.ctx.mode();
        let full_location = self.location("output", at, mode);
        let filtered_location = self.location("filtered", at, mode);

        let full_uri = self.store(&full_location, &result.combined_output()).await;

        let filtered = classified.filtered_text();
        let filtered_body = if filtered.is_empty() {
            EMPTY_FILTERED_PLACEHOLDER
        } else {
            filtered.as_str()
        };
        let filtered_uri = self.store(&filtered_location, filtered_body).await;

        // Dry-run readers want the would-remove list; real-run readers the full log.
        let (output_location, output_uri) = if self.ctx.dry_run {
            (&filtered_location, filtered_uri.clone())
        } else {
            (&full_location, full_uri.clone())
        };
        let output_url = self.presign(output_location, &output_uri).await;

        let error = match result.exit_code {
            Some(0) => String::new(),
            Some(code) => ExecutorError::ProcessFailure { code }.to_string(),
            None => "cleanup tool exited without an exit code".to_string(),
        };

        info!(
            exit_code = ?result.exit_code,
            resources = classified.resource_count,
            output_uri = %output_uri,
            "run output persisted"
        );

        ResultEnvelope {
            success: result.success(),
            error: bounded(&error, MAX_ERROR_LEN),
            output: None,
            output_uri,
            full_output_uri: full_uri,
            filtered_output_uri: Some(filtered_uri),
            output_url,
            resources_to_delete: classified.resource_count,
            dry_run: self.ctx.dry_run,
            send_notification: self.ctx.send_notification,
        }
    }

    async fn report_error(&self, report: ErrorReport, at: DateTime<Utc>) -> ResultEnvelope {
        let location = self.location("error", at, &report.qualifier);
        let uri = self.store(&location, &report.document).await;
        let output_url = self.presign(&location, &uri).await;

        ResultEnvelope {
            success: false,
            error: bounded(&report.error, MAX_ERROR_LEN),
            output: Some(bounded(&report.document, MAX_OUTPUT_PREVIEW_LEN)),
            output_uri: uri.clone(),
            full_output_uri: uri,
            filtered_output_uri: None,
            output_url,
            resources_to_delete: 0,
            dry_run: self.ctx.dry_run,
            send_notification: self.ctx.send_notification,
        }
    }

    /// `<prefix>/<account>/nuke-<kind>-<yyyymmdd-HHMMSS>-<qualifier>.txt`
    fn location(&self, kind: &str, at: DateTime<Utc>, qualifier: &str) -> ObjectLocation {
        let file = format!(
            "nuke-{kind}-{}-{qualifier}.txt",
            at.format("%Y%m%d-%H%M%S")
        );
        let key = [self.ctx.prefix.trim_matches('/'), self.ctx.account_id.as_str(), file.as_str()]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join("/");
        ObjectLocation::new(self.ctx.bucket.clone(), key)
    }

    /// Upload `body`; on failure return the intended URI with a marker.
    async fn store(&self, location: &ObjectLocation, body: &str) -> String {
        match self
            .store
            .put(location, body.as_bytes(), CONTENT_TYPE)
            .await
        {
            Ok(()) => {
                debug!(uri = %location, bytes = body.len(), "stored object");
                location.to_string()
            }
            Err(e) => {
                let err = ExecutorError::PersistenceFailure {
                    uri: location.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "upload failed, reporting annotated uri");
                format!("{location} {UPLOAD_FAILED_MARKER}")
            }
        }
    }

    /// Shareable URL for a successfully stored object.
    async fn presign(&self, location: &ObjectLocation, uri: &str) -> Option<String> {
        if uri.ends_with(UPLOAD_FAILED_MARKER) {
            return None;
        }
        match self.store.presign_get(location, PRESIGN_TTL).await {
            Ok(url) => Some(url),
            Err(e) => {
                debug!(uri = %uri, error = %e, "could not presign output");
                None
            }
        }
    }
}
