//! In-memory fakes for the network collaborators (testing only)
//!
//! Both fakes count calls so tests can assert that a code path made no
//! network requests at all.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ExecutorError, Result};
use crate::registry::{ArtifactFetcher, ReleaseRegistry};

// ---------------------------------------------------------------------------
// StaticRegistry
// ---------------------------------------------------------------------------

/// Registry that always answers with the same tag or the same failure.
#[derive(Debug)]
pub struct StaticRegistry {
    answer: std::result::Result<String, String>,
    calls: AtomicUsize,
}

impl StaticRegistry {
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            answer: Ok(tag.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            answer: Err(reason.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseRegistry for StaticRegistry {
    async fn latest_tag(&self, _timeout: Duration) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().map_err(ExecutorError::Registry)
    }
}

// ---------------------------------------------------------------------------
// MemoryFetcher
// ---------------------------------------------------------------------------

/// Fetcher serving canned bodies by URL; unknown URLs fail like a 404.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    requested: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: impl Into<String>, body: Vec<u8>) -> Self {
        self.bodies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), body);
        self
    }

    /// URLs requested so far, in order.
    pub fn requested(&self) -> Vec<String> {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn calls(&self) -> usize {
        self.requested().len()
    }
}

#[async_trait]
impl ArtifactFetcher for MemoryFetcher {
    async fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>> {
        self.requested
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(url.to_string());

        self.bodies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .ok_or_else(|| ExecutorError::DownloadFailure(format!("{url} returned status 404 Not Found")))
    }
}
