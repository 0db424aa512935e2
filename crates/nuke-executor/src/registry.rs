//! Network collaborators: release registry lookup and archive download.
//!
//! Both are traits so acquisition can be exercised without a network;
//! `GithubReleases` is the production implementation over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ExecutorError, Result};

/// Source of the latest published release tag.
#[async_trait]
pub trait ReleaseRegistry: Send + Sync {
    /// Fetch the latest release tag, giving up after `timeout`.
    async fn latest_tag(&self, timeout: Duration) -> Result<String>;
}

/// Downloads release artifacts.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the full body at `url`, giving up after `timeout`.
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>>;
}

#[derive(Debug, Deserialize)]
struct LatestRelease {
    tag_name: String,
}

/// Parse a latest-release payload into its tag.
pub(crate) fn parse_latest_tag(body: &[u8]) -> Result<String> {
    let release: LatestRelease = serde_json::from_slice(body)
        .map_err(|e| ExecutorError::Registry(format!("malformed release payload: {e}")))?;
    let tag = release.tag_name.trim();
    if tag.is_empty() {
        return Err(ExecutorError::Registry("release payload has an empty tag_name".into()));
    }
    Ok(tag.to_string())
}

/// GitHub releases over HTTPS.
pub struct GithubReleases {
    registry_url: String,
    http_client: reqwest::Client,
}

impl GithubReleases {
    pub fn new(registry_url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("nuke-executor/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            registry_url: registry_url.into(),
            http_client,
        })
    }
}

#[async_trait]
impl ReleaseRegistry for GithubReleases {
    async fn latest_tag(&self, timeout: Duration) -> Result<String> {
        debug!(url = %self.registry_url, "querying release registry");

        let response = self
            .http_client
            .get(&self.registry_url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ExecutorError::Registry(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Err(ExecutorError::Registry(format!(
                "registry returned status {}",
                response.status()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ExecutorError::Registry(e.to_string()))?;
        parse_latest_tag(&body)
    }
}

#[async_trait]
impl ArtifactFetcher for GithubReleases {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let response = self
            .http_client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ExecutorError::DownloadFailure(format!("{url}: {e}")))?;

        if response.status() != StatusCode::OK {
            return Err(ExecutorError::DownloadFailure(format!(
                "{url} returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExecutorError::DownloadFailure(format!("{url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}
