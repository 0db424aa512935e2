//! Binary acquisition: cache check, download, extraction, verification.
//!
//! The canonical binary lives at `<scratch>/<tool_name>`. A handle is only
//! ever handed out after that file answered a `--version` probe.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tar::Archive;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, Result};
use crate::obs;
use crate::probe::probe_version;
use crate::registry::{ArtifactFetcher, ReleaseRegistry};
use crate::version::{VersionPolicy, VersionResolver};

/// How many archive members are listed in the debug log.
const LISTED_MEMBERS: usize = 10;

/// Where a verified binary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionSource {
    /// Reused from scratch space; no network call was made.
    Cached,
    /// Downloaded and extracted during this invocation.
    Downloaded,
}

impl AcquisitionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionSource::Cached => "cached",
            AcquisitionSource::Downloaded => "downloaded",
        }
    }
}

/// A verified, executable cleanup binary.
///
/// Only `BinaryAcquirer` constructs handles, and only after a passing
/// version probe.
#[derive(Debug, Clone)]
pub struct BinaryHandle {
    path: PathBuf,
    version: Option<String>,
    version_info: String,
    source: AcquisitionSource,
    archive_sha256: Option<String>,
}

impl BinaryHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release that was downloaded; `None` for cache hits.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Output of the version probe.
    pub fn version_info(&self) -> &str {
        &self.version_info
    }

    pub fn source(&self) -> AcquisitionSource {
        self.source
    }

    /// SHA-256 of the downloaded archive, hex encoded.
    pub fn archive_sha256(&self) -> Option<&str> {
        self.archive_sha256.as_deref()
    }
}

/// Guarantees a verified binary at the canonical path.
pub struct BinaryAcquirer {
    config: ExecutorConfig,
    resolver: VersionResolver,
    fetcher: Arc<dyn ArtifactFetcher>,
}

impl BinaryAcquirer {
    pub fn new(
        config: ExecutorConfig,
        registry: Arc<dyn ReleaseRegistry>,
        fetcher: Arc<dyn ArtifactFetcher>,
    ) -> Self {
        let resolver = VersionResolver::new(registry, config.registry_timeout());
        Self {
            config,
            resolver,
            fetcher,
        }
    }

    pub async fn acquire(&self, policy: &VersionPolicy) -> Result<BinaryHandle> {
        let handle = match self.cached().await {
            Some(handle) => handle,
            None => {
                let version = self.resolver.resolve(policy).await;
                self.download(&version).await?
            }
        };

        obs::emit_binary_acquired(
            handle.source.as_str(),
            &handle.path,
            handle.version.as_deref().unwrap_or(&handle.version_info),
        );
        Ok(handle)
    }

    /// Cache hit path: existing executable that passes the probe.
    async fn cached(&self) -> Option<BinaryHandle> {
        let path = self.config.canonical_binary_path();
        let metadata = fs::metadata(&path).await.ok()?;
        if !metadata.is_file() || !is_executable(&metadata) {
            debug!(path = %path.display(), "no executable binary in scratch space");
            return None;
        }

        match probe_version(&path, self.config.probe_timeout()).await {
            Ok(version_info) => {
                info!(path = %path.display(), "binary already present in scratch space");
                Some(BinaryHandle {
                    path,
                    version: None,
                    version_info,
                    source: AcquisitionSource::Cached,
                    archive_sha256: None,
                })
            }
            Err(err) => {
                warn!(error = %err, "cached binary failed its probe, downloading a fresh copy");
                None
            }
        }
    }

    async fn download(&self, version: &str) -> Result<BinaryHandle> {
        let platform = self.config.target_platform()?;
        let url = self.config.download_url(version, &platform);
        info!(url = %url, "downloading cleanup tool archive");

        let bytes = self
            .fetcher
            .fetch(&url, self.config.download_timeout())
            .await?;
        if bytes.is_empty() {
            return Err(ExecutorError::DownloadFailure(format!(
                "downloaded archive from {url} is empty"
            )));
        }

        let scratch = &self.config.scratch_dir;
        fs::create_dir_all(scratch).await?;
        let archive_path = self.config.archive_path();
        fs::write(&archive_path, &bytes).await?;
        let digest = hex::encode(Sha256::digest(&bytes));
        info!(
            bytes = bytes.len(),
            sha256 = %digest,
            path = %archive_path.display(),
            "saved archive"
        );

        let staging = tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(scratch)?;
        let dest = staging.path().to_path_buf();
        let tool_name = self.config.tool_name.clone();
        let members =
            tokio::task::spawn_blocking(move || extract_candidates(&bytes, &tool_name, &dest))
                .await
                .map_err(|e| {
                    ExecutorError::DownloadFailure(format!("extraction task failed: {e}"))
                })??;

        let canonical = self.config.canonical_binary_path();
        for candidate in &members.candidates {
            if *candidate != canonical {
                debug!(from = %candidate.display(), to = %canonical.display(), "moving candidate into place");
                fs::rename(candidate, &canonical).await?;
            }
            make_executable(&canonical).await?;

            match probe_version(&canonical, self.config.probe_timeout()).await {
                Ok(version_info) => {
                    return Ok(BinaryHandle {
                        path: canonical,
                        version: Some(version.to_string()),
                        version_info,
                        source: AcquisitionSource::Downloaded,
                        archive_sha256: Some(digest),
                    });
                }
                Err(err) => {
                    warn!(candidate = %candidate.display(), error = %err, "candidate failed probe, trying next member");
                    if let Err(e) = fs::remove_file(&canonical).await {
                        debug!(error = %e, "could not remove rejected candidate");
                    }
                }
            }
        }

        Err(ExecutorError::BinaryNotFound {
            tool: self.config.tool_name.clone(),
            examined: members.examined,
        })
    }
}

/// Result of scanning an archive.
#[derive(Debug)]
struct ExtractedMembers {
    /// Extracted files whose member name contains the tool name, archive order.
    candidates: Vec<PathBuf>,
    /// Every member seen, matching or not.
    examined: usize,
}

fn extraction_error(err: std::io::Error) -> ExecutorError {
    ExecutorError::DownloadFailure(format!("could not read archive: {err}"))
}

/// Open `archive` as tar.gz and unpack every regular member whose name
/// contains `tool_name` under `dest`.
fn extract_candidates(archive: &[u8], tool_name: &str, dest: &Path) -> Result<ExtractedMembers> {
    let mut archive = Archive::new(GzDecoder::new(Cursor::new(archive)));
    let mut candidates = Vec::new();
    let mut examined = 0;

    for entry in archive.entries().map_err(extraction_error)? {
        let mut entry = entry.map_err(extraction_error)?;
        examined += 1;

        let name = entry.path().map_err(extraction_error)?.into_owned();
        if examined <= LISTED_MEMBERS {
            debug!(member = %name.display(), size = entry.size(), "archive member");
        }
        if !name.to_string_lossy().contains(tool_name) {
            continue;
        }
        if !entry.header().entry_type().is_file() {
            continue;
        }
        if !entry.unpack_in(dest).map_err(extraction_error)? {
            warn!(member = %name.display(), "skipping member with unsafe path");
            continue;
        }

        info!(member = %name.display(), size = entry.size(), "found potential binary");
        candidates.push(dest.join(&name));
    }

    Ok(ExtractedMembers {
        candidates,
        examined,
    })
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    true
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tar_gz(members: &[(&str, &[u8])]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (name, body) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *body).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn test_extract_selects_members_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tar_gz(&[
            ("README.md", b"docs"),
            ("LICENSE", b"license"),
            ("aws-nuke", b"binary"),
        ]);

        let members = extract_candidates(&archive, "aws-nuke", dir.path()).unwrap();

        assert_eq!(members.examined, 3);
        assert_eq!(members.candidates, vec![dir.path().join("aws-nuke")]);
        assert_eq!(std::fs::read(dir.path().join("aws-nuke")).unwrap(), b"binary");
    }

    #[test]
    fn test_extract_keeps_archive_order() {
        let dir = tempfile::tempdir().unwrap();
        let archive = tar_gz(&[
            ("aws-nuke-broken", b"x"),
            ("dist/aws-nuke", b"y"),
        ]);

        let members = extract_candidates(&archive, "aws-nuke", dir.path()).unwrap();

        assert_eq!(
            members.candidates,
            vec![dir.path().join("aws-nuke-broken"), dir.path().join("dist/aws-nuke")]
        );
    }

    #[test]
    fn test_extract_rejects_non_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_candidates(b"definitely not gzip", "aws-nuke", dir.path()).unwrap_err();
        assert!(matches!(err, ExecutorError::DownloadFailure(_)));
    }

    #[test]
    fn test_source_names() {
        assert_eq!(AcquisitionSource::Cached.as_str(), "cached");
        assert_eq!(AcquisitionSource::Downloaded.as_str(), "downloaded");
    }
}
