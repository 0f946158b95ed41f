//! Parsing of granule identifiers into storage locations.

use std::fmt;
use std::path::PathBuf;

use crate::error::{StorageError, StorageResult};

/// Host suffix of virtual-hosted S3 URLs. Stripping it from the host gives
/// the bucket name.
const S3_HOST_SUFFIX: &str = ".s3.amazonaws.com";

/// Where a granule's bytes live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GranuleLocation {
    /// A file on the local filesystem
    Local(PathBuf),
    /// An object in an S3 bucket
    S3 { bucket: String, key: String },
    /// A file behind a generic HTTP(S) origin, e.g. "https://host:8080"
    Http { origin: String, path: String },
}

impl GranuleLocation {
    /// Parse a granule identifier.
    ///
    /// `http(s)://<bucket>.s3.amazonaws.com/<key>` URLs are read through the
    /// bucket rather than over plain HTTP.
    pub fn parse(identifier: &str) -> StorageResult<Self> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(StorageError::InvalidLocation("empty identifier".to_string()));
        }

        if let Some(rest) = identifier.strip_prefix("s3://") {
            let (bucket, key) = split_host_path(rest, identifier)?;
            return Ok(GranuleLocation::S3 {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        for scheme in ["https://", "http://"] {
            if let Some(rest) = identifier.strip_prefix(scheme) {
                let (host, path) = split_host_path(rest, identifier)?;
                if let Some(bucket) = host.strip_suffix(S3_HOST_SUFFIX) {
                    return Ok(GranuleLocation::S3 {
                        bucket: bucket.to_string(),
                        key: path.to_string(),
                    });
                }
                return Ok(GranuleLocation::Http {
                    origin: format!("{}{}", scheme, host),
                    path: path.to_string(),
                });
            }
        }

        if identifier.contains("://") && !identifier.starts_with("file://") {
            return Err(StorageError::InvalidLocation(format!(
                "unsupported scheme in '{}'",
                identifier
            )));
        }

        let path = identifier.strip_prefix("file://").unwrap_or(identifier);
        Ok(GranuleLocation::Local(PathBuf::from(path)))
    }

    /// Key of the remote store serving this location, if any.
    pub fn store_key(&self) -> Option<&str> {
        match self {
            GranuleLocation::Local(_) => None,
            GranuleLocation::S3 { bucket, .. } => Some(bucket),
            GranuleLocation::Http { origin, .. } => Some(origin),
        }
    }

    /// File name component, used for temp files and log fields.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            GranuleLocation::Local(path) => path.file_name().and_then(|n| n.to_str()),
            GranuleLocation::S3 { key, .. } => key.rsplit('/').next(),
            GranuleLocation::Http { path, .. } => path.rsplit('/').next(),
        }
    }
}

fn split_host_path<'a>(rest: &'a str, identifier: &str) -> StorageResult<(&'a str, &'a str)> {
    match rest.split_once('/') {
        Some((host, path)) if !host.is_empty() && !path.is_empty() => Ok((host, path)),
        _ => Err(StorageError::InvalidLocation(format!(
            "expected <host>/<path> in '{}'",
            identifier
        ))),
    }
}

impl fmt::Display for GranuleLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GranuleLocation::Local(path) => write!(f, "{}", path.display()),
            GranuleLocation::S3 { bucket, key } => write!(f, "s3://{}/{}", bucket, key),
            GranuleLocation::Http { origin, path } => write!(f, "{}/{}", origin, path),
        }
    }
}
