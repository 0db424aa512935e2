//! Nuke-State: durable object storage for the nuke execution step
//!
//! This crate is the storage boundary of the executor. Policy documents are
//! read through it and execution outputs are written through it; nothing
//! else in the workspace touches a bucket directly.
//!
//! ## Key Components
//!
//! - `ObjectLocation`: bucket + key, parsed from `s3://bucket/key`
//! - `ObjectStore`: put / get / presigned-URL contract
//! - `BackendObjectStore`: S3, local-directory or in-memory store picked
//!   from a store URI, used by the CLI
//! - `fakes::MemoryObjectStore`: in-memory store with failure injection

mod backend;
mod error;
pub mod fakes;
pub mod storage_traits;

pub use backend::BackendObjectStore;
pub use error::StorageError;
pub use storage_traits::{ObjectLocation, ObjectStore, StorageResult, PRESIGN_TTL};
