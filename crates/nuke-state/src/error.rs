//! Error types for nuke-state

use thiserror::Error;

/// Errors that can occur in the object storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// URI is not of the form `s3://bucket/key`
    #[error("invalid storage URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Bucket name rejected by the backend
    #[error("invalid bucket name: {0:?}")]
    InvalidBucket(String),

    /// Object does not exist
    #[error("object not found: s3://{bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Backend refused or failed the operation
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Store cannot produce shareable URLs
    #[error("store {0} cannot presign URLs")]
    PresignUnsupported(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_renders_uri() {
        let err = StorageError::NotFound {
            bucket: "acct-bucket".to_string(),
            key: "policies/a.yaml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "object not found: s3://acct-bucket/policies/a.yaml"
        );
    }

    #[test]
    fn test_invalid_uri_mentions_reason() {
        let err = StorageError::InvalidUri {
            uri: "http://x".to_string(),
            reason: "unsupported scheme".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("http://x"));
        assert!(msg.contains("unsupported scheme"));
    }
}
