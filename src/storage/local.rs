//! Local filesystem blob store.
//!
//! Blobs are stored as flat files under a configurable root directory.
//! The blob key is used directly as a relative path
//! (e.g., `images/{owner_uid}/{asset_id}`).
//!
//! All writes follow crash-only design: write to temp file, fsync, rename.

use bytes::Bytes;
use std::future::Future;
use std::io::Write;
use std::path::PathBuf;
use std::pin::Pin;

use super::backend::{public_url, validate_key, BlobStore};

/// Stores blobs on the local filesystem.
pub struct LocalBlobStore {
    /// Root directory for all stored blobs.
    root: PathBuf,
    /// Base URL the HTTP surface serves blobs from.
    base_url: String,
}

impl LocalBlobStore {
    /// Create a new `LocalBlobStore` rooted at `root`.
    ///
    /// The directory will be created if it does not exist.
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> anyhow::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(".tmp"))?;
        Ok(Self {
            root,
            base_url: base_url.to_string(),
        })
    }

    /// Resolve a blob key to an absolute file path.
    ///
    /// Rejects keys with `..`, empty or absolute segments so the path stays
    /// under the root directory.
    fn resolve(&self, key: &str) -> anyhow::Result<PathBuf> {
        validate_key(key)?;
        let path = self.root.join(key);
        if path.exists() {
            let canonical_root = self.root.canonicalize()?;
            if !path.canonicalize()?.starts_with(&canonical_root) {
                anyhow::bail!("Path traversal detected in blob key: {}", key);
            }
        }
        Ok(path)
    }

    /// Generate a temp file path under .tmp/ for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(".tmp").join(format!("tmp-{}", id))
    }
}

impl BlobStore for LocalBlobStore {
    fn put(
        &self,
        key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let final_path = self.resolve(&key)?;

            if let Some(parent) = final_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            // Crash-only: temp-fsync-rename pattern.
            let tmp_path = self.temp_path();
            if let Some(parent) = tmp_path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;

            std::fs::rename(&tmp_path, &final_path)?;

            tracing::debug!(key = %key, bytes = data.len(), "Blob written");
            Ok(self.url_for(&key))
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Bytes>>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            if !path.is_file() {
                return Ok(None);
            }
            let data = std::fs::read(&path)?;
            Ok(Some(Bytes::from(data)))
        })
    }

    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            match std::fs::remove_file(&path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn exists(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let key = key.to_string();
        Box::pin(async move {
            let path = self.resolve(&key)?;
            Ok(path.is_file())
        })
    }

    fn url_for(&self, key: &str) -> String {
        public_url(&self.base_url, key)
    }
}
