//! Comprehensive tests running every BlobStore backend through the same checks

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use futures::StreamExt;

    use crate::storage::mock_store::MockBlobStore;
    use crate::storage::object_store_backend::ObjectStoreBackend;
    use crate::storage::{read_all, single_chunk, BlobStore, StoreError};

    fn backends() -> Vec<(&'static str, Arc<dyn BlobStore>)> {
        vec![
            ("mock", Arc::new(MockBlobStore::new())),
            ("object_store", Arc::new(ObjectStoreBackend::in_memory())),
        ]
    }

    async fn fetch(store: &Arc<dyn BlobStore>, key: &str) -> Result<Bytes, StoreError> {
        read_all(store.get(key).await?.body).await
    }

    #[tokio::test]
    async fn test_object_lifecycle() {
        for (name, store) in backends() {
            let key = "20240315/abcdefghijklmnop";
            assert!(!store.head_exists(key).await.unwrap(), "{}", name);

            store.put(key, single_chunk(Bytes::from_static(b"lifecycle"))).await.unwrap();
            assert!(store.head_exists(key).await.unwrap(), "{}", name);
            assert_eq!(&fetch(&store, key).await.unwrap()[..], b"lifecycle", "{}", name);

            store.delete(key).await.unwrap();
            assert!(!store.head_exists(key).await.unwrap(), "{}", name);
            assert!(store.get(key).await.unwrap_err().is_not_found(), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_bucket_delete_is_scoped_to_one_day() {
        for (name, store) in backends() {
            for key in [
                "20240101/aaaaaaaaaaaaaaaa",
                "20240101/bbbbbbbbbbbbbbbb",
                "20240102/aaaaaaaaaaaaaaaa",
                "20240110/aaaaaaaaaaaaaaaa",
            ] {
                store.put(key, single_chunk(Bytes::from(key.to_string()))).await.unwrap();
            }

            assert!(store.head_exists("20240101/").await.unwrap(), "{}", name);
            store.delete("20240101/").await.unwrap();
            assert!(!store.head_exists("20240101/").await.unwrap(), "{}", name);

            assert!(store.head_exists("20240102/").await.unwrap(), "{}", name);
            assert!(store.head_exists("20240110/").await.unwrap(), "{}", name);
            assert_eq!(
                &fetch(&store, "20240110/aaaaaaaaaaaaaaaa").await.unwrap()[..],
                b"20240110/aaaaaaaaaaaaaaaa",
                "{}",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_empty_and_large_payloads() {
        for (name, store) in backends() {
            store.put("20240315/emptyemptyemptye", single_chunk(Bytes::new())).await.unwrap();
            let empty = store.get("20240315/emptyemptyemptye").await.unwrap();
            assert_eq!(empty.size, 0, "{}", name);
            assert!(read_all(empty.body).await.unwrap().is_empty(), "{}", name);

            let large: Vec<u8> = (0..1024 * 1024).map(|i| (i % 256) as u8).collect();
            let chunks: Vec<Result<Bytes, StoreError>> =
                large.chunks(64 * 1024).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
            store
                .put("20240315/largelargelargel", futures::stream::iter(chunks).boxed())
                .await
                .unwrap();
            assert_eq!(fetch(&store, "20240315/largelargelargel").await.unwrap().to_vec(), large, "{}", name);
        }
    }

    #[tokio::test]
    async fn test_concurrent_puts() {
        for (name, store) in backends() {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let store = Arc::clone(&store);
                    tokio::spawn(async move {
                        let key = format!("20240315/concurrent{:07}", i);
                        let data = Bytes::from(format!("payload {}", i));
                        store.put(&key, single_chunk(data.clone())).await.unwrap();
                        assert_eq!(fetch(&store, &key).await.unwrap(), data);
                    })
                })
                .collect();

            for handle in handles {
                handle.await.unwrap();
            }
            assert!(store.head_exists("20240315/").await.unwrap(), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_aborted_upload_leaves_no_object() {
        for (name, store) in backends() {
            let body = futures::stream::iter(vec![
                Ok(Bytes::from_static(b"first chunk")),
                Err(StoreError::Aborted("payload too large".to_string())),
            ])
            .boxed();
            assert!(store.put("20240315/abortedabortedab", body).await.is_err(), "{}", name);
            assert!(!store.head_exists("20240315/abortedabortedab").await.unwrap(), "{}", name);
        }
    }
}
