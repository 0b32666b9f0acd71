//! Object Store Client Abstraction
//!
//! This module provides an abstraction over the durable object store that
//! holds uploaded blobs, so the gateway and the expiration worker can run
//! against a remote S3-compatible bucket, an in-memory store, or a mock
//! without knowing which.
//!
//! Keys ending in `/` address a whole day-bucket: `head_exists` reports
//! whether anything lives under that prefix and `delete` removes all of it.

pub mod config;
pub mod mock_store;
pub mod object_store_backend;

#[cfg(test)]
mod comprehensive_test;

use std::fmt;

use actix_web::http::StatusCode;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

use crate::naming::SEPARATOR;

/// Failures reported by a [`BlobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("object store request failed: {0}")]
    Backend(String),

    #[error("object store request timed out after {0}s")]
    Timeout(u64),

    /// The producer of an upload body gave up part way through
    #[error("upload aborted: {0}")]
    Aborted(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Blob contents as a stream of chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, StoreError>>;

/// An object opened for reading
pub struct StoredObject {
    pub size: u64,
    /// Entity tag reported by the store, if any
    pub e_tag: Option<String>,
    pub body: ByteStream,
}

impl fmt::Debug for StoredObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredObject")
            .field("size", &self.size)
            .field("e_tag", &self.e_tag)
            .finish_non_exhaustive()
    }
}

/// Stream yielding `data` as its only chunk
pub fn single_chunk(data: Bytes) -> ByteStream {
    futures::stream::once(async move { Ok(data) }).boxed()
}

/// Collect a whole stream into memory, stopping at the first error
pub async fn read_all(mut body: ByteStream) -> Result<Bytes, StoreError> {
    let mut data = BytesMut::new();
    while let Some(chunk) = body.next().await {
        data.extend_from_slice(&chunk?);
    }
    Ok(data.freeze())
}

/// Trait defining the object store interface
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stream `body` into the object at `key`, returning the status the store
    /// reported. An `Err` item in `body` abandons the upload and nothing is
    /// stored.
    async fn put(&self, key: &str, body: ByteStream) -> Result<StatusCode, StoreError>;

    /// Open the blob stored under `key` for streaming
    async fn get(&self, key: &str) -> Result<StoredObject, StoreError>;

    /// Lightweight existence probe. Not-found is `Ok(false)`, not an error.
    async fn head_exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete the object or bucket addressed by `key`
    async fn delete(&self, key: &str) -> Result<StatusCode, StoreError>;
}

/// True when `key` addresses a whole day-bucket rather than one object.
pub fn is_bucket_address(key: &str) -> bool {
    key.ends_with(SEPARATOR)
}
