//! Mock implementation of BlobStore for testing

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

use actix_web::http::StatusCode;
use async_trait::async_trait;
use bytes::Bytes;
use log::info;

use crate::storage::{is_bucket_address, read_all, single_chunk, BlobStore, ByteStream, StoreError, StoredObject};

/// Store operations recorded by [`MockBlobStore`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Put(String),
    Get(String),
    Head(String),
    Delete(String),
}

#[derive(Default)]
struct MockState {
    objects: BTreeMap<String, Bytes>,
    calls: Vec<MockCall>,
    failing_heads: HashSet<String>,
    failing_deletes: HashSet<String>,
    fail_puts: bool,
    put_status: Option<StatusCode>,
}

/// In-memory BlobStore with call recording and failure injection
#[derive(Clone, Default)]
pub struct MockBlobStore {
    state: Arc<Mutex<MockState>>,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert an object directly, bypassing call recording
    pub fn seed(&self, key: &str, data: &[u8]) {
        self.lock().objects.insert(key.to_string(), Bytes::copy_from_slice(data));
    }

    /// Number of stored objects
    pub fn object_count(&self) -> usize {
        self.lock().objects.len()
    }

    /// Check if an object exists
    pub fn object_exists(&self, key: &str) -> bool {
        self.lock().objects.contains_key(key)
    }

    /// List all stored keys in order
    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    /// Make every existence probe of `key` fail
    pub fn fail_head(&self, key: &str) {
        self.lock().failing_heads.insert(key.to_string());
    }

    /// Make every delete of `key` fail
    pub fn fail_delete(&self, key: &str) {
        self.lock().failing_deletes.insert(key.to_string());
    }

    /// Make every put fail
    pub fn fail_puts(&self) {
        self.lock().fail_puts = true;
    }

    /// Status reported by successful puts, 200 unless overridden
    pub fn set_put_status(&self, status: StatusCode) {
        self.lock().put_status = Some(status);
    }

    /// Remove all data, calls and injected failures
    pub fn clear(&self) {
        *self.lock() = MockState::default();
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn put(&self, key: &str, body: ByteStream) -> Result<StatusCode, StoreError> {
        {
            let mut state = self.lock();
            state.calls.push(MockCall::Put(key.to_string()));
            if state.fail_puts {
                return Err(StoreError::Backend(format!("mock put failure for {}", key)));
            }
        }

        let data = read_all(body).await?;
        info!("Mock: Stored {} bytes at {}", data.len(), key);
        let mut state = self.lock();
        state.objects.insert(key.to_string(), data);
        Ok(state.put_status.unwrap_or(StatusCode::OK))
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StoreError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Get(key.to_string()));
        let data = state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(StoredObject {
            size: data.len() as u64,
            e_tag: Some(format!("\"{}\"", hex::encode(md5::compute(&data).0))),
            body: single_chunk(data),
        })
    }

    async fn head_exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Head(key.to_string()));
        if state.failing_heads.contains(key) {
            return Err(StoreError::Backend(format!("mock head failure for {}", key)));
        }
        if is_bucket_address(key) {
            Ok(state.objects.keys().any(|k| k.starts_with(key)))
        } else {
            Ok(state.objects.contains_key(key))
        }
    }

    async fn delete(&self, key: &str) -> Result<StatusCode, StoreError> {
        let mut state = self.lock();
        state.calls.push(MockCall::Delete(key.to_string()));
        if state.failing_deletes.contains(key) {
            return Err(StoreError::Backend(format!("mock delete failure for {}", key)));
        }
        if is_bucket_address(key) {
            state.objects.retain(|k, _| !k.starts_with(key));
        } else {
            state.objects.remove(key);
        }
        info!("Mock: Deleted {}", key);
        Ok(StatusCode::OK)
    }
}
