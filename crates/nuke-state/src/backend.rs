//! `object_store`-backed implementation of [`ObjectStore`].
//!
//! The backend is picked from a store URI:
//!
//! - `s3://` talks to AWS S3; credentials and region come from the usual
//!   `AWS_*` environment. `s3://[access:secret@]host[:port]` targets an
//!   S3-compatible endpoint (MinIO, localstack) with path-style requests.
//! - `file:///path` keeps objects under `<path>/<bucket>/<key>`.
//! - `memory://` keeps objects in process memory.
//!
//! Only the S3 backend can hand out presigned URLs. Signing is local and
//! does not check that the object exists.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::signer::Signer;
use object_store::{Attribute, Attributes, ObjectStore as _, PutOptions, PutPayload};
use tracing::debug;
use url::Url;

use crate::error::StorageError;
use crate::storage_traits::{ObjectLocation, ObjectStore, StorageResult};

enum Backend {
    /// One client per bucket, built from a shared template.
    S3 {
        template: AmazonS3Builder,
        clients: Mutex<HashMap<String, Arc<AmazonS3>>>,
    },
    /// Single flat store; the bucket becomes the first path segment.
    Local(LocalFileSystem),
    Memory(InMemory),
}

/// Object store selected from a store URI.
pub struct BackendObjectStore {
    uri: String,
    backend: Backend,
}

impl BackendObjectStore {
    /// Build a store from `s3://...`, `file:///path` or `memory://`.
    pub fn from_uri(uri: &str) -> StorageResult<Self> {
        let invalid = |reason: String| StorageError::InvalidUri {
            uri: uri.to_string(),
            reason,
        };
        let url = Url::parse(uri).map_err(|e| invalid(e.to_string()))?;

        let backend = match url.scheme() {
            "s3" => Backend::S3 {
                template: s3_template(&url),
                clients: Mutex::new(HashMap::new()),
            },
            "file" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(invalid("file store must name a directory".into()));
                }
                std::fs::create_dir_all(path)?;
                Backend::Local(LocalFileSystem::new_with_prefix(path).map_err(backend_error)?)
            }
            "memory" => Backend::Memory(InMemory::new()),
            scheme => {
                return Err(invalid(format!(
                    "unsupported store scheme {scheme:?} (expected s3, file or memory)"
                )))
            }
        };

        debug!(store = %uri, "opened object store");
        Ok(Self {
            uri: uri.to_string(),
            backend,
        })
    }

    /// The URI this store was built from.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn s3_client(
        template: &AmazonS3Builder,
        clients: &Mutex<HashMap<String, Arc<AmazonS3>>>,
        bucket: &str,
    ) -> StorageResult<Arc<AmazonS3>> {
        let mut clients = clients.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(client) = clients.get(bucket) {
            return Ok(client.clone());
        }
        let client = Arc::new(
            template
                .clone()
                .with_bucket_name(bucket)
                .build()
                .map_err(backend_error)?,
        );
        clients.insert(bucket.to_string(), client.clone());
        Ok(client)
    }
}

/// `AmazonS3Builder` seeded from the `AWS_*` environment, pointed at a
/// custom endpoint when the URI names a host.
fn s3_template(url: &Url) -> AmazonS3Builder {
    let mut builder = AmazonS3Builder::from_env();

    let access_key = url.username();
    if !access_key.is_empty() {
        builder = builder
            .with_access_key_id(access_key)
            .with_secret_access_key(url.password().unwrap_or(""));
    }

    if let Some(host) = url.host_str().filter(|h| !h.is_empty()) {
        let port = url.port();
        let scheme = if port == Some(443) { "https" } else { "http" };
        let endpoint = match port {
            Some(p) => format!("{scheme}://{host}:{p}"),
            None => format!("{scheme}://{host}"),
        };
        builder = builder
            .with_endpoint(endpoint)
            .with_allow_http(true)
            .with_virtual_hosted_style_request(false);
    }

    builder
}

fn backend_error(err: object_store::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn storage_error(location: &ObjectLocation, err: object_store::Error) -> StorageError {
    match err {
        object_store::Error::NotFound { .. } => StorageError::NotFound {
            bucket: location.bucket.clone(),
            key: location.key.clone(),
        },
        other => backend_error(other),
    }
}

fn object_path(raw: &str, location: &ObjectLocation) -> StorageResult<ObjectPath> {
    ObjectPath::parse(raw).map_err(|e| StorageError::InvalidUri {
        uri: location.to_string(),
        reason: e.to_string(),
    })
}

/// Bucket-qualified path for the single-store backends.
fn flat_path(location: &ObjectLocation) -> StorageResult<ObjectPath> {
    if location.bucket.is_empty() || location.bucket.contains('/') {
        return Err(StorageError::InvalidBucket(location.bucket.clone()));
    }
    object_path(&format!("{}/{}", location.bucket, location.key), location)
}

fn typed_put(content_type: &str) -> PutOptions {
    let mut attributes = Attributes::new();
    attributes.insert(Attribute::ContentType, content_type.to_string().into());
    PutOptions {
        attributes,
        ..Default::default()
    }
}

#[async_trait]
impl ObjectStore for BackendObjectStore {
    async fn put(
        &self,
        location: &ObjectLocation,
        body: &[u8],
        content_type: &str,
    ) -> StorageResult<()> {
        debug!(uri = %location, bytes = body.len(), "writing object");
        let payload = PutPayload::from(body.to_vec());

        let result = match &self.backend {
            Backend::S3 { template, clients } => {
                if location.bucket.is_empty() {
                    return Err(StorageError::InvalidBucket(location.bucket.clone()));
                }
                let client = Self::s3_client(template, clients, &location.bucket)?;
                let path = object_path(&location.key, location)?;
                client.put_opts(&path, payload, typed_put(content_type)).await
            }
            // LocalFileSystem rejects object attributes.
            Backend::Local(store) => store.put(&flat_path(location)?, payload).await,
            Backend::Memory(store) => {
                store
                    .put_opts(&flat_path(location)?, payload, typed_put(content_type))
                    .await
            }
        };

        result.map(|_| ()).map_err(|e| storage_error(location, e))
    }

    async fn get(&self, location: &ObjectLocation) -> StorageResult<Vec<u8>> {
        let result = match &self.backend {
            Backend::S3 { template, clients } => {
                let client = Self::s3_client(template, clients, &location.bucket)?;
                client.get(&object_path(&location.key, location)?).await
            }
            Backend::Local(store) => store.get(&flat_path(location)?).await,
            Backend::Memory(store) => store.get(&flat_path(location)?).await,
        };

        let bytes = result
            .map_err(|e| storage_error(location, e))?
            .bytes()
            .await
            .map_err(|e| storage_error(location, e))?;
        Ok(bytes.to_vec())
    }

    async fn presign_get(&self, location: &ObjectLocation, ttl: Duration) -> StorageResult<String> {
        match &self.backend {
            Backend::S3 { template, clients } => {
                let client = Self::s3_client(template, clients, &location.bucket)?;
                let path = object_path(&location.key, location)?;
                let url = client
                    .signed_url(reqwest::Method::GET, &path, ttl)
                    .await
                    .map_err(|e| storage_error(location, e))?;
                Ok(url.to_string())
            }
            Backend::Local(_) | Backend::Memory(_) => {
                Err(StorageError::PresignUnsupported(self.uri.clone()))
            }
        }
    }
}
