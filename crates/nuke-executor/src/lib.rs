//! Nuke Executor - the execution step of the account cleanup workflow
//!
//! Given a pointer to a generated policy document, this crate:
//! - Resolves which release of the cleanup tool to use
//! - Guarantees a verified binary in scratch space (cache, or download + extract)
//! - Runs the tool under a hard wall-clock limit
//! - Classifies its output (dry-run vs real-run) and persists it
//! - Returns a `ResultEnvelope` for every outcome, never an error

pub mod acquire;
pub mod classify;
pub mod config;
pub mod error;
pub mod fakes;
pub mod obs;
pub mod orchestrator;
pub mod platform;
pub mod probe;
pub mod registry;
pub mod reporter;
pub mod request;
pub mod runner;
pub mod telemetry;
pub mod version;

// Re-export key types
pub use acquire::{AcquisitionSource, BinaryAcquirer, BinaryHandle};
pub use classify::{classify, ClassifiedOutput};
pub use config::ExecutorConfig;
pub use error::{ExecutorError, Result};
pub use orchestrator::{FailReason, Orchestrator, Stage};
pub use platform::TargetPlatform;
pub use registry::{ArtifactFetcher, GithubReleases, ReleaseRegistry};
pub use reporter::{Outcome, ReportContext, ResultReporter};
pub use request::{ExecutionRequest, ResultEnvelope};
pub use runner::{ExecutionResult, ProcessRunner};
pub use telemetry::init_tracing;
pub use version::{VersionPolicy, VersionResolver};
