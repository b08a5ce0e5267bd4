//! In-memory blob store.
//!
//! Blobs are held in a `tokio::sync::RwLock<HashMap<...>>`.  Nothing is
//! persisted; useful for tests and ephemeral demos.  An optional byte limit
//! caps the total stored size.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use super::backend::{public_url, validate_key, BlobStore};

/// In-memory blob store.
pub struct MemoryBlobStore {
    /// key -> blob bytes.
    blobs: tokio::sync::RwLock<HashMap<String, Bytes>>,
    /// Base URL reported for stored blobs.
    base_url: String,
    /// Maximum bytes allowed.  0 means unlimited.
    max_size_bytes: u64,
}

impl MemoryBlobStore {
    /// Create an unlimited store whose URLs start with `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self::with_limit(base_url, 0)
    }

    /// Create a store that refuses writes beyond `max_size_bytes` in total.
    pub fn with_limit(base_url: &str, max_size_bytes: u64) -> Self {
        Self {
            blobs: tokio::sync::RwLock::new(HashMap::new()),
            base_url: base_url.to_string(),
            max_size_bytes,
        }
    }

    /// Number of blobs currently stored.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether the store holds no blobs.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// All stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new("memory://blobs")
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(
        &self,
        key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            validate_key(&key)?;
            let mut blobs = self.blobs.write().await;
            if self.max_size_bytes > 0 {
                let current: u64 = blobs
                    .iter()
                    .filter(|(k, _)| **k != key)
                    .map(|(_, v)| v.len() as u64)
                    .sum();
                if current + data.len() as u64 > self.max_size_bytes {
                    anyhow::bail!(
                        "Memory limit exceeded: current={current}, additional={}, max={}",
                        data.len(),
                        self.max_size_bytes
                    );
                }
            }
            blobs.insert(key.clone(), data);
            Ok(self.url_for(&key))
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Bytes>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            Ok(blobs.get(&key).cloned())
        })
    }

    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let mut blobs = self.blobs.write().await;
            Ok(blobs.remove(&key).is_some())
        })
    }

    fn exists(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let blobs = self.blobs.read().await;
            Ok(blobs.contains_key(&key))
        })
    }

    fn url_for(&self, key: &str) -> String {
        public_url(&self.base_url, key)
    }
}
