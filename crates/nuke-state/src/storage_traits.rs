//! Storage trait definitions for the nuke executor
//!
//! `ObjectStore` is the only storage abstraction the executor needs:
//! - `put`: write an object (execution outputs, error documents)
//! - `get`: read an object (the policy document)
//! - `presign_get`: produce a time-limited shareable URL for an object
//!
//! The trait is async and backend-agnostic. An in-memory fake is provided
//! for testing via the `fakes` module.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Lifetime of presigned URLs handed to the notification step.
pub const PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const SCHEME: &str = "s3://";

// ---------------------------------------------------------------------------
// ObjectLocation
// ---------------------------------------------------------------------------

/// Bucket + key pair addressing one object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse an `s3://bucket/key` URI.
    ///
    /// The key may contain further slashes; bucket and key must both be
    /// non-empty.
    pub fn parse(uri: &str) -> StorageResult<Self> {
        let invalid = |reason: &str| StorageError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let rest = uri
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected s3:// scheme"))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| invalid("missing object key"))?;

        if bucket.is_empty() {
            return Err(invalid("missing bucket"));
        }
        if key.is_empty() {
            return Err(invalid("missing object key"));
        }

        Ok(Self::new(bucket, key))
    }

    /// File name component of the key (text after the last `/`).
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.key)
    }
}

impl std::str::FromStr for ObjectLocation {
    type Err = StorageError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// ObjectStore
// ---------------------------------------------------------------------------

/// Durable object storage.
///
/// Guarantees:
/// - `get(loc)` after a successful `put(loc, body, _)` returns `body`.
/// - `get` on an absent object returns `StorageError::NotFound`.
/// - `presign_get` never mutates the store. Stores that cannot sign return
///   `StorageError::PresignUnsupported`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `body` at `location`, replacing any existing object.
    async fn put(&self, location: &ObjectLocation, body: &[u8], content_type: &str)
        -> StorageResult<()>;

    /// Read the object at `location`.
    async fn get(&self, location: &ObjectLocation) -> StorageResult<Vec<u8>>;

    /// Produce a URL that grants read access to `location` for `ttl`.
    async fn presign_get(&self, location: &ObjectLocation, ttl: Duration) -> StorageResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_key() {
        let loc = ObjectLocation::parse("s3://nuke-bucket/configs/123456789012/nuke.yaml").unwrap();
        assert_eq!(loc.bucket, "nuke-bucket");
        assert_eq!(loc.key, "configs/123456789012/nuke.yaml");
        assert_eq!(loc.file_name(), "nuke.yaml");
    }

    #[test]
    fn test_display_roundtrip() {
        let uri = "s3://b/k/with/parts.txt";
        let loc: ObjectLocation = uri.parse().unwrap();
        assert_eq!(loc.to_string(), uri);
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        let err = ObjectLocation::parse("https://bucket/key").unwrap_err();
        assert!(matches!(err, StorageError::InvalidUri { .. }));
    }

    #[test]
    fn test_parse_rejects_missing_parts() {
        assert!(ObjectLocation::parse("s3://bucket-only").is_err());
        assert!(ObjectLocation::parse("s3://bucket/").is_err());
        assert!(ObjectLocation::parse("s3:///key").is_err());
    }

    #[test]
    fn test_presign_ttl_is_seven_days() {
        assert_eq!(PRESIGN_TTL.as_secs(), 604_800);
    }
}
