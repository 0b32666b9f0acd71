//! `object_store` backed implementation of [`BlobStore`]

use std::sync::Arc;

use actix_web::http::StatusCode;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use log::{debug, info, warn};
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{ObjectStore, WriteMultipart};

use crate::storage::{is_bucket_address, BlobStore, ByteStream, StoreError, StoredObject};

/// Parts allowed in flight before the upload stops pulling from the body
const MAX_INFLIGHT_PARTS: usize = 8;

fn map_err(key: &str, err: object_store::Error) -> StoreError {
    match err {
        object_store::Error::NotFound { .. } => StoreError::NotFound(key.to_string()),
        other => StoreError::Backend(other.to_string()),
    }
}

/// Store client over any [`ObjectStore`]: an S3-compatible bucket in
/// production, [`InMemory`] for local runs.
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        info!("Using in-memory object store; uploads are lost on restart");
        Self::new(Arc::new(InMemory::new()))
    }

    fn path(key: &str) -> Path {
        Path::from(key)
    }
}

async fn abandon(key: &str, writer: WriteMultipart) {
    if let Err(e) = writer.abort().await {
        warn!("Failed to abort multipart upload of {}: {}", key, e);
    }
}

#[async_trait]
impl BlobStore for ObjectStoreBackend {
    async fn put(&self, key: &str, mut body: ByteStream) -> Result<StatusCode, StoreError> {
        let upload = self
            .store
            .put_multipart(&Self::path(key))
            .await
            .map_err(|e| map_err(key, e))?;
        let mut writer = WriteMultipart::new(upload);
        let mut size = 0u64;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    debug!("Abandoning upload of {}: {}", key, e);
                    abandon(key, writer).await;
                    return Err(e);
                }
            };
            if let Err(e) = writer.wait_for_capacity(MAX_INFLIGHT_PARTS).await {
                abandon(key, writer).await;
                return Err(map_err(key, e));
            }
            size += chunk.len() as u64;
            writer.write(&chunk);
        }

        writer.finish().await.map_err(|e| map_err(key, e))?;
        debug!("Stored {} bytes at {}", size, key);
        Ok(StatusCode::OK)
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StoreError> {
        let result = self.store.get(&Self::path(key)).await.map_err(|e| map_err(key, e))?;
        let size = result.meta.size;
        let e_tag = result.meta.e_tag.clone();
        let owned_key = key.to_string();
        let body = result
            .into_stream()
            .map_err(move |e| map_err(&owned_key, e))
            .boxed();
        Ok(StoredObject { size, e_tag, body })
    }

    async fn head_exists(&self, key: &str) -> Result<bool, StoreError> {
        if is_bucket_address(key) {
            let prefix = Self::path(key);
            let mut listing = self.store.list(Some(&prefix));
            return match listing.next().await {
                Some(Ok(_)) => Ok(true),
                Some(Err(object_store::Error::NotFound { .. })) | None => Ok(false),
                Some(Err(e)) => Err(map_err(key, e)),
            };
        }

        match self.store.head(&Self::path(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_err(key, e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<StatusCode, StoreError> {
        if !is_bucket_address(key) {
            self.store.delete(&Self::path(key)).await.map_err(|e| map_err(key, e))?;
            return Ok(StatusCode::OK);
        }

        let prefix = Self::path(key);
        let locations = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .boxed();
        let removed = self
            .store
            .delete_stream(locations)
            .try_fold(0usize, |count, _| async move { Ok(count + 1) })
            .await
            .map_err(|e| map_err(key, e))?;
        debug!("Deleted {} objects under {}", removed, key);
        Ok(StatusCode::OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{read_all, single_chunk};
    use bytes::Bytes;

    async fn fetch(store: &ObjectStoreBackend, key: &str) -> Result<Bytes, StoreError> {
        read_all(store.get(key).await?.body).await
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = ObjectStoreBackend::in_memory();
        let status = store
            .put("20240315/abcdefghijklmnop", single_chunk(Bytes::from_static(b"hello")))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);

        let object = store.get("20240315/abcdefghijklmnop").await.unwrap();
        assert_eq!(object.size, 5);
        assert!(object.e_tag.is_some());
        assert_eq!(&read_all(object.body).await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn test_chunked_body_is_reassembled() {
        let store = ObjectStoreBackend::in_memory();
        // larger than one multipart part
        let chunks: Vec<Result<Bytes, StoreError>> = (0..12u8)
            .map(|i| Ok(Bytes::from(vec![i; 1024 * 1024])))
            .collect();
        store
            .put("20240315/chunkedchunkedch", futures::stream::iter(chunks).boxed())
            .await
            .unwrap();

        let data = fetch(&store, "20240315/chunkedchunkedch").await.unwrap();
        assert_eq!(data.len(), 12 * 1024 * 1024);
        assert_eq!(data[0], 0);
        assert_eq!(data[11 * 1024 * 1024], 11);
    }

    #[tokio::test]
    async fn test_aborted_body_stores_nothing() {
        let store = ObjectStoreBackend::in_memory();
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StoreError::Aborted("client went away".to_string())),
        ];
        let err = store
            .put("20240315/abortedabortedab", futures::stream::iter(chunks).boxed())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Aborted(_)));
        assert!(!store.head_exists("20240315/abortedabortedab").await.unwrap());
        assert!(!store.head_exists("20240315/").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = ObjectStoreBackend::in_memory();
        let err = store.get("20240315/missingmissingmi").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_head_exists_on_objects_and_buckets() {
        let store = ObjectStoreBackend::in_memory();
        assert!(!store.head_exists("20240101/").await.unwrap());
        assert!(!store.head_exists("20240101/aaaaaaaaaaaaaaaa").await.unwrap());

        store
            .put("20240101/aaaaaaaaaaaaaaaa", single_chunk(Bytes::from_static(b"a")))
            .await
            .unwrap();
        assert!(store.head_exists("20240101/").await.unwrap());
        assert!(store.head_exists("20240101/aaaaaaaaaaaaaaaa").await.unwrap());
        assert!(!store.head_exists("20240102/").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_bucket_removes_only_that_day() {
        let store = ObjectStoreBackend::in_memory();
        for (key, data) in [
            ("20240101/aaaaaaaaaaaaaaaa", "a"),
            ("20240101/bbbbbbbbbbbbbbbb", "b"),
            ("20240102/cccccccccccccccc", "c"),
        ] {
            store.put(key, single_chunk(Bytes::from(data))).await.unwrap();
        }

        store.delete("20240101/").await.unwrap();

        assert!(!store.head_exists("20240101/").await.unwrap());
        assert!(fetch(&store, "20240101/aaaaaaaaaaaaaaaa").await.is_err());
        assert!(fetch(&store, "20240101/bbbbbbbbbbbbbbbb").await.is_err());
        assert_eq!(&fetch(&store, "20240102/cccccccccccccccc").await.unwrap()[..], b"c");
    }
}
