//! Version resolution: pinned fallback, optionally upgraded from the registry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::registry::ReleaseRegistry;

/// Which release the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPolicy {
    /// Pinned fallback version, e.g. `v3.56.2`.
    pub requested: String,
    /// When true, the registry is never consulted.
    pub enforce: bool,
}

impl VersionPolicy {
    pub fn new(requested: impl Into<String>, enforce: bool) -> Self {
        Self {
            requested: requested.into(),
            enforce,
        }
    }
}

/// Chooses between the fallback and the latest published tag.
///
/// The comparison is plain lexicographic string ordering, so `v10.0.0`
/// sorts below `v9.0.0`.
pub fn pick_version(fallback: &str, fetched: &str) -> String {
    if fetched >= fallback {
        fetched.to_string()
    } else {
        fallback.to_string()
    }
}

/// Resolves a `VersionPolicy` to a concrete release. Never fails.
pub struct VersionResolver {
    registry: Arc<dyn ReleaseRegistry>,
    timeout: Duration,
}

impl VersionResolver {
    pub fn new(registry: Arc<dyn ReleaseRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub async fn resolve(&self, policy: &VersionPolicy) -> String {
        if policy.enforce {
            info!(version = %policy.requested, "version enforced, skipping registry lookup");
            return policy.requested.clone();
        }

        match self.registry.latest_tag(self.timeout).await {
            Ok(tag) => {
                let chosen = pick_version(&policy.requested, &tag);
                info!(latest = %tag, fallback = %policy.requested, chosen = %chosen, "resolved tool version");
                chosen
            }
            Err(err) => {
                warn!(error = %err, fallback = %policy.requested, "could not fetch latest version, using fallback");
                policy.requested.clone()
            }
        }
    }
}
