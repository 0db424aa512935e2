//! Structured observability hooks for the invocation lifecycle.
//!
//! - `invocation_span` tags everything logged during one invocation with its
//!   invocation id and account
//! - `emit_*` functions log the lifecycle milestones as `event = "..."` fields
//!
//! Events are emitted at `info!` level (filter with `NUKE_LOG`); failures at
//! `warn!`.

use std::path::Path;

use tracing::{info, warn, Span};

/// Span covering one invocation.
///
/// Attach it with `tracing::Instrument` so the invocation future stays
/// `Send`:
///
/// ```ignore
/// run_stages(request).instrument(invocation_span(&id, &account)).await
/// // every log line now carries invocation_id and account_id
/// ```
pub fn invocation_span(invocation_id: &str, account_id: &str) -> Span {
    tracing::info_span!(
        "nuke.invocation",
        invocation_id = %invocation_id,
        account_id = %account_id
    )
}

/// Emit event: the orchestrator moved to a new stage.
pub fn emit_stage_entered(stage: &str) {
    info!(event = "stage.entered", stage = %stage);
}

/// Emit event: a verified binary is ready.
pub fn emit_binary_acquired(source: &str, path: &Path, version: &str) {
    info!(
        event = "binary.acquired",
        source = %source,
        path = %path.display(),
        version = %version,
    );
}

/// Emit event: the cleanup process exited or was killed.
pub fn emit_process_finished(exit_code: Option<i32>, elapsed_ms: u64, timed_out: bool) {
    info!(
        event = "process.finished",
        exit_code = ?exit_code,
        elapsed_ms = elapsed_ms,
        timed_out = timed_out,
    );
}

/// Emit event: the result envelope is assembled.
pub fn emit_envelope_ready(success: bool, resources: usize, output_uri: &str) {
    info!(
        event = "envelope.ready",
        success = success,
        resources_to_delete = resources,
        output_uri = %output_uri,
    );
}

/// Emit event: the invocation ended in a failure state.
pub fn emit_failure(stage: &str, reason: &str, error: &dyn std::fmt::Display) {
    warn!(event = "invocation.failed", stage = %stage, reason = %reason, error = %error);
}
