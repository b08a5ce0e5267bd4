//! Asset coordinator and listing drafts.
//!
//! Photos are uploaded before the listing that references them exists.  Each
//! upload gets a fresh `asset_id` first; that id is the only handle used for
//! the asset afterwards, both in the [`Draft`] and in the persisted listing,
//! and it fixes the blob key `images/{owner_uid}/{asset_id}`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use crate::errors::CatalogError;
use crate::metrics::{record_asset_op, BYTES_UPLOADED_TOTAL};
use crate::storage::backend::BlobStore;

/// Content types accepted when no explicit list is configured.
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png"];

/// Guess a content type from a file name's extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// A file chosen by the seller, not yet uploaded.
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    /// Declared content type.
    pub content_type: String,
    pub bytes: Bytes,
}

impl SelectedFile {
    pub fn new(name: &str, content_type: &str, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.to_string(),
            content_type: content_type.to_string(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk, declaring its type from the extension.
    pub async fn from_path(path: &Path) -> anyhow::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo")
            .to_string();
        let content_type = content_type_for(&name);
        Ok(Self {
            name,
            content_type: content_type.to_string(),
            bytes: Bytes::from(bytes),
        })
    }
}

/// In-process handle on a photo's bytes for immediate display.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPreview {
    pub content_type: String,
    pub data: Bytes,
}

impl LocalPreview {
    /// Render as a `data:` URL.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            base64::engine::general_purpose::STANDARD.encode(&self.data)
        )
    }
}

/// One uploaded photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Asset {
    pub owner_uid: String,
    /// UUID v4 allocated before the upload started.
    pub asset_id: String,
    /// Original file name, for display.
    pub source_name: String,
    /// Publicly fetchable URL of the uploaded blob.
    pub remote_url: String,
    /// Only present in the process that staged the asset.
    #[serde(skip)]
    pub local_preview: Option<LocalPreview>,
}

impl Asset {
    pub fn storage_key(&self) -> String {
        storage_key(&self.owner_uid, &self.asset_id)
    }
}

/// Blob key of an asset.
pub fn storage_key(owner_uid: &str, asset_id: &str) -> String {
    format!("images/{owner_uid}/{asset_id}")
}

/// Uploads and deletes photo blobs on behalf of drafts and listings.
pub struct AssetCoordinator {
    blobs: Arc<dyn BlobStore>,
    allowed_types: Vec<String>,
}

impl AssetCoordinator {
    pub fn new(blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            blobs,
            allowed_types: DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Replace the accepted content types.
    pub fn with_allowed_types(mut self, allowed_types: Vec<String>) -> Self {
        self.allowed_types = allowed_types;
        self
    }

    pub fn blobs(&self) -> &Arc<dyn BlobStore> {
        &self.blobs
    }

    /// Upload `file` under `owner_uid`'s namespace.
    ///
    /// Every rejection happens before the blob store is contacted.  Uploads
    /// are idempotent per `asset_id`, never retried here.
    pub async fn stage_upload(
        &self,
        owner_uid: Option<&str>,
        file: SelectedFile,
    ) -> Result<Asset, CatalogError> {
        let owner_uid = owner_uid.ok_or(CatalogError::Unauthenticated)?;
        if !self.allowed_types.iter().any(|t| *t == file.content_type) {
            return Err(CatalogError::validation(format!(
                "Unsupported file type {} for {}; allowed: {}",
                file.content_type,
                file.name,
                self.allowed_types.join(", ")
            )));
        }
        if file.bytes.is_empty() {
            return Err(CatalogError::validation(format!("{} is empty", file.name)));
        }

        let local_preview = LocalPreview {
            content_type: file.content_type.clone(),
            data: file.bytes.clone(),
        };
        let asset_id = uuid::Uuid::new_v4().to_string();
        let key = storage_key(owner_uid, &asset_id);
        let size = file.bytes.len() as u64;

        let remote_url = match self.blobs.put(&key, file.bytes).await {
            Ok(url) => url,
            Err(e) => {
                record_asset_op("stage", false);
                return Err(CatalogError::StoreUnavailable(e));
            }
        };
        record_asset_op("stage", true);
        metrics::counter!(BYTES_UPLOADED_TOTAL).increment(size);
        debug!(key = %key, bytes = size, "Staged {}", file.name);

        Ok(Asset {
            owner_uid: owner_uid.to_string(),
            asset_id,
            source_name: file.name,
            remote_url,
            local_preview: Some(local_preview),
        })
    }

    /// Delete the blob of an asset that never made it into a listing.
    pub async fn discard_staged(&self, asset: &Asset) -> Result<(), CatalogError> {
        let result = self.delete_blob(asset).await;
        record_asset_op("discard_staged", result.is_ok());
        result
    }

    /// Delete the blob of an asset whose listing record is already gone.
    pub async fn discard_persisted(&self, asset: &Asset) -> Result<(), CatalogError> {
        let result = self.delete_blob(asset).await;
        record_asset_op("discard_persisted", result.is_ok());
        result
    }

    async fn delete_blob(&self, asset: &Asset) -> Result<(), CatalogError> {
        let key = asset.storage_key();
        if self.blobs.delete(&key).await? {
            debug!(key = %key, "Deleted blob");
            Ok(())
        } else {
            Err(CatalogError::not_found(format!("blob {key}")))
        }
    }
}

/// The staged photos of a listing being composed.
///
/// Assets are appended when their upload completes, so concurrent stages
/// end up in completion order.  The lock is never held across an await.
pub struct Draft {
    coordinator: Arc<AssetCoordinator>,
    assets: Mutex<Vec<Asset>>,
}

impl Draft {
    pub fn new(coordinator: Arc<AssetCoordinator>) -> Self {
        Self {
            coordinator,
            assets: Mutex::new(Vec::new()),
        }
    }

    /// Upload `file` and append the resulting asset.
    pub async fn stage(
        &self,
        owner_uid: Option<&str>,
        file: SelectedFile,
    ) -> Result<Asset, CatalogError> {
        let asset = self.coordinator.stage_upload(owner_uid, file).await?;
        self.assets
            .lock()
            .expect("mutex poisoned")
            .push(asset.clone());
        Ok(asset)
    }

    /// Remove an asset from the draft, then delete its blob.
    ///
    /// The asset stays removed when the blob delete fails; the error is
    /// returned so the caller can report the orphan.
    pub async fn discard(&self, asset_id: &str) -> Result<(), CatalogError> {
        let removed = {
            let mut assets = self.assets.lock().expect("mutex poisoned");
            let index = assets
                .iter()
                .position(|a| a.asset_id == asset_id)
                .ok_or_else(|| CatalogError::not_found(format!("asset {asset_id}")))?;
            assets.remove(index)
        };
        if let Err(e) = self.coordinator.discard_staged(&removed).await {
            warn!(
                key = %removed.storage_key(),
                "Removed from draft but the blob could not be deleted: {e}"
            );
            return Err(e);
        }
        Ok(())
    }

    /// Copy of the current asset sequence.
    pub fn snapshot(&self) -> Vec<Asset> {
        self.assets.lock().expect("mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.assets.lock().expect("mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget every asset without touching the blobs (after a successful
    /// create the listing owns them).
    pub fn clear(&self) {
        self.assets.lock().expect("mutex poisoned").clear();
    }

    /// Drop every staged asset and delete its blob.  Returns the number of
    /// blobs that could not be deleted.
    pub async fn abandon(&self) -> usize {
        let assets = std::mem::take(&mut *self.assets.lock().expect("mutex poisoned"));
        let results = futures::future::join_all(
            assets.iter().map(|asset| self.coordinator.discard_staged(asset)),
        )
        .await;

        let mut failed = 0;
        for (asset, result) in assets.iter().zip(results) {
            if let Err(e) = result {
                warn!(key = %asset.storage_key(), "Abandoned blob could not be deleted: {e}");
                failed += 1;
            }
        }
        if !assets.is_empty() {
            info!(
                discarded = assets.len() - failed,
                failed, "Abandoned draft"
            );
        }
        failed
    }
}
