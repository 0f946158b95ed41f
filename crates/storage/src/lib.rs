//! Storage abstractions for velocity granules.
//!
//! Granules are addressed by URL or path and may live:
//! - on the local filesystem
//! - in an S3 bucket (`s3://bucket/key` or `https://bucket.s3.amazonaws.com/key`)
//! - behind a plain HTTP(S) server
//!
//! Remote stores are built once per run and shared read-only between fetch
//! workers.

pub mod error;
pub mod location;
pub mod object_store;

pub use self::object_store::{GranuleStores, ObjectStorage, ObjectStorageConfig};
pub use error::{StorageError, StorageResult};
pub use location::GranuleLocation;
