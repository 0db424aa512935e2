//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryObjectStore`, which satisfies the `ObjectStore` contract
//! without any external dependencies and can be told to fail writes.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    content_type: String,
}

/// In-memory object store backed by a `BTreeMap<(bucket, key), object>`.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), StoredObject>>,
    fail_puts: AtomicBool,
    put_attempts: AtomicUsize,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When `true`, every subsequent `put` returns `StorageError::Backend`.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Number of `put` calls made, including failed ones.
    pub fn put_attempts(&self) -> usize {
        self.put_attempts.load(Ordering::SeqCst)
    }

    /// Body of a stored object as UTF-8 text, if present.
    pub fn text(&self, location: &ObjectLocation) -> Option<String> {
        self.lock()
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|o| String::from_utf8_lossy(&o.body).into_owned())
    }

    /// Content type recorded for a stored object.
    pub fn content_type(&self, location: &ObjectLocation) -> Option<String> {
        self.lock()
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|o| o.content_type.clone())
    }

    /// All stored locations, ordered by bucket then key.
    pub fn locations(&self) -> Vec<ObjectLocation> {
        self.lock()
            .keys()
            .map(|(bucket, key)| ObjectLocation::new(bucket.clone(), key.clone()))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<(String, String), StoredObject>> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        location: &ObjectLocation,
        body: &[u8],
        content_type: &str,
    ) -> StorageResult<()> {
        self.put_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!(
                "injected put failure for {location}"
            )));
        }
        if location.bucket.is_empty() {
            return Err(StorageError::InvalidBucket(location.bucket.clone()));
        }
        self.lock().insert(
            (location.bucket.clone(), location.key.clone()),
            StoredObject {
                body: body.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, location: &ObjectLocation) -> StorageResult<Vec<u8>> {
        self.lock()
            .get(&(location.bucket.clone(), location.key.clone()))
            .map(|o| o.body.clone())
            .ok_or_else(|| StorageError::NotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            })
    }

    async fn presign_get(&self, location: &ObjectLocation, ttl: Duration) -> StorageResult<String> {
        if !self
            .lock()
            .contains_key(&(location.bucket.clone(), location.key.clone()))
        {
            return Err(StorageError::NotFound {
                bucket: location.bucket.clone(),
                key: location.key.clone(),
            });
        }
        Ok(format!(
            "memory://{}/{}?ttl={}",
            location.bucket,
            location.key,
            ttl.as_secs()
        ))
    }
}
