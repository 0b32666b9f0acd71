//! Construction of the object store client from configuration

use std::sync::Arc;

use log::info;
use object_store::aws::AmazonS3Builder;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::StorageConfig;
use crate::error::ConfigurationError;
use crate::storage::object_store_backend::ObjectStoreBackend;
use crate::storage::BlobStore;

const DEFAULT_REGION: &str = "us-east-1";

/// Available object store backends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    S3,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "s3" | "cos" | "remote" => Ok(StorageBackend::S3),
            "memory" | "mem" | "mock" => Ok(StorageBackend::Memory),
            _ => Err(format!("Unknown storage backend: {}", s)),
        }
    }
}

/// Backend credential triple
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Credentials {
    pub key: String,
    pub secret: String,
    pub session_token: String,
}

impl Credentials {
    /// Parse `key:secret:session`. Missing parts are left empty.
    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, ':');
        let mut next = || parts.next().unwrap_or_default().to_string();
        Self {
            key: next(),
            secret: next(),
            session_token: next(),
        }
    }
}

/// Where the bucket lives, derived from the configured bucket URL
#[derive(Debug, Clone, PartialEq)]
pub struct BucketLocation {
    pub endpoint: Url,
    pub bucket: String,
    pub region: String,
}

impl BucketLocation {
    /// Parse a virtual-hosted bucket URL such as
    /// `https://<bucket>.cos.<region>.myqcloud.com`.
    pub fn parse(raw: &str, region: Option<&str>) -> Result<Self, ConfigurationError> {
        let endpoint = Url::parse(raw).map_err(|e| ConfigurationError::InvalidBucketUrl(format!("{}: {}", raw, e)))?;
        let host = endpoint
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigurationError::InvalidBucketUrl(format!("{}: missing host", raw)))?;

        let labels: Vec<&str> = host.split('.').collect();
        let bucket = labels[0].to_string();
        let derived_region = labels
            .iter()
            .position(|label| *label == "cos" || *label == "s3")
            .and_then(|idx| labels.get(idx + 1))
            .filter(|_| labels.len() > 3)
            .map(|r| r.to_string());

        let region = region
            .map(str::to_string)
            .or(derived_region)
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Self {
            endpoint,
            bucket,
            region,
        })
    }
}

/// Create the store client described by `config`.
pub fn create_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>, ConfigurationError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(ObjectStoreBackend::in_memory())),
        StorageBackend::S3 => {
            let location = BucketLocation::parse(&config.bucket_url, config.region.as_deref())?;
            let credentials = Credentials::parse(&config.os_secret);
            info!(
                "Using S3-compatible object store: bucket={}, region={}, endpoint={}",
                location.bucket, location.region, location.endpoint
            );

            let mut builder = AmazonS3Builder::new()
                .with_endpoint(location.endpoint.as_str().trim_end_matches('/'))
                .with_bucket_name(&location.bucket)
                .with_region(&location.region)
                .with_virtual_hosted_style_request(true)
                .with_allow_http(location.endpoint.scheme() == "http")
                .with_access_key_id(&credentials.key)
                .with_secret_access_key(&credentials.secret);
            if !credentials.session_token.is_empty() {
                builder = builder.with_token(&credentials.session_token);
            }

            let store = builder.build()?;
            Ok(Arc::new(ObjectStoreBackend::new(Arc::new(store))))
        }
    }
}
