//! Object storage access for granules (S3 buckets and HTTP origins).

use bytes::Bytes;
use object_store::{aws::AmazonS3Builder, http::HttpBuilder, path::Path, ObjectStore};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::{StorageError, StorageResult};
use crate::location::GranuleLocation;

/// Configuration for S3 access.
///
/// Without credentials, buckets are read anonymously over HTTPS, which is
/// how the public ITS_LIVE bucket is served.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    /// Custom S3 endpoint (MinIO, localstack); None for AWS
    pub endpoint: Option<String>,
    /// AWS region of the buckets
    pub region: String,
    /// Access key ID
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Allow HTTP (for local MinIO)
    pub allow_http: bool,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            region: "us-west-2".to_string(),
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
        }
    }
}

impl ObjectStorageConfig {
    /// Overlay the standard AWS environment variables on the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("AWS_ENDPOINT_URL").ok(),
            region: std::env::var("AWS_REGION").unwrap_or(defaults.region),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").ok(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").ok(),
            allow_http: std::env::var("S3_ALLOW_HTTP")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(defaults.allow_http),
        }
    }

    fn has_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

/// Read-only client for one bucket or HTTP origin.
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    name: String,
}

impl ObjectStorage {
    /// Client for an S3 bucket.
    pub fn s3(config: &ObjectStorageConfig, bucket: &str) -> StorageResult<Self> {
        if !config.has_credentials() {
            let url = match &config.endpoint {
                Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
                None => format!("https://{}.s3.{}.amazonaws.com", bucket, config.region),
            };
            debug!(bucket = %bucket, url = %url, "Using anonymous HTTPS access");
            let mut storage = Self::http(&url)?;
            storage.name = bucket.to_string();
            return Ok(storage);
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(&config.region);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }
        if let (Some(key), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key)
                .with_secret_access_key(secret);
        }
        if config.allow_http {
            builder = builder.with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Backend(format!("Failed to create S3 client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            name: bucket.to_string(),
        })
    }

    /// Client for a plain HTTP(S) origin.
    pub fn http(origin: &str) -> StorageResult<Self> {
        let store = HttpBuilder::new()
            .with_url(origin)
            .build()
            .map_err(|e| StorageError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            store: Arc::new(store),
            name: origin.to_string(),
        })
    }

    /// Read bytes from a path.
    #[instrument(skip(self), fields(store = %self.name, path = %path))]
    pub async fn get(&self, path: &str) -> StorageResult<Bytes> {
        let location = Path::from(path);

        let result = self
            .store
            .get(&location)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read {}: {}", path, e)))?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to read bytes: {}", e)))?;

        debug!(size = bytes.len(), "Read object");
        Ok(bytes)
    }
}

/// The set of remote stores a run needs, keyed by bucket or origin.
///
/// Built once before any fetch starts and never mutated afterwards, so it is
/// shared between workers behind an `Arc` without locking.
#[derive(Default)]
pub struct GranuleStores {
    stores: HashMap<String, ObjectStorage>,
}

impl GranuleStores {
    /// Build a client for every distinct bucket/origin among `locations`.
    pub fn connect<'a>(
        config: &ObjectStorageConfig,
        locations: impl IntoIterator<Item = &'a GranuleLocation>,
    ) -> StorageResult<Self> {
        let mut stores = HashMap::new();
        for location in locations {
            let Some(key) = location.store_key() else {
                continue;
            };
            if stores.contains_key(key) {
                continue;
            }
            let storage = match location {
                GranuleLocation::S3 { bucket, .. } => ObjectStorage::s3(config, bucket)?,
                GranuleLocation::Http { origin, .. } => ObjectStorage::http(origin)?,
                GranuleLocation::Local(_) => continue,
            };
            stores.insert(key.to_string(), storage);
        }

        if !stores.is_empty() {
            info!(stores = stores.len(), "Connected granule stores");
        }
        Ok(Self { stores })
    }

    /// Read a granule's full contents.
    pub async fn fetch(&self, location: &GranuleLocation) -> StorageResult<Bytes> {
        match location {
            GranuleLocation::Local(path) => {
                let data = tokio::fs::read(path).await.map_err(|e| StorageError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Ok(Bytes::from(data))
            }
            GranuleLocation::S3 { bucket, key } => self.store(bucket)?.get(key).await,
            GranuleLocation::Http { origin, path } => self.store(origin)?.get(path).await,
        }
    }

    fn store(&self, key: &str) -> StorageResult<&ObjectStorage> {
        self.stores
            .get(key)
            .ok_or_else(|| StorageError::NotConfigured(key.to_string()))
    }
}
