//! carlot library -- vehicle listing catalog.
//!
//! A listing is a record in a document store plus a set of photos in a blob
//! store.  This crate keeps the two consistent as one logical unit across
//! create, display, search and delete: the [`assets`] coordinator stages
//! photos before a listing exists, the [`catalog`] persists and deletes
//! listings, and the [`session`] tracks which seller is signed in.

use std::sync::Arc;

pub mod assets;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod metadata;
pub mod metrics;
pub mod server;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::metadata::store::DocumentStore;
use crate::storage::backend::BlobStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
pub struct AppState {
    /// Loaded configuration.
    pub config: Config,
    /// Listing record store.
    pub documents: Arc<dyn DocumentStore>,
    /// Photo blob store.
    pub blobs: Arc<dyn BlobStore>,
    /// Catalog over `documents` and `blobs`.
    pub catalog: Arc<Catalog>,
}

impl AppState {
    /// Open the stores named by `config` and build the catalog over them.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let documents: Arc<dyn DocumentStore> = match config.metadata.engine.as_str() {
            "memory" => {
                tracing::info!("In-memory metadata store initialized");
                Arc::new(metadata::memory::MemoryDocumentStore::new())
            }
            "sqlite" => {
                let path = &config.metadata.sqlite.path;
                ensure_parent_dir(path)?;
                let store = metadata::sqlite::SqliteDocumentStore::new(path)?;
                tracing::info!("SQLite metadata store initialized at {}", path);
                Arc::new(store)
            }
            other => anyhow::bail!("Unknown metadata.engine '{other}' (expected sqlite or memory)"),
        };

        let base_url = config.server.public_base_url();
        let blobs: Arc<dyn BlobStore> = match config.storage.backend.as_str() {
            "memory" => {
                let limit = config.storage.memory.max_size_bytes;
                tracing::info!("In-memory blob store initialized (limit {} bytes)", limit);
                Arc::new(storage::memory::MemoryBlobStore::with_limit(&base_url, limit))
            }
            "local" => {
                let root = &config.storage.local.root_dir;
                let store = storage::local::LocalBlobStore::new(root, &base_url)?;
                tracing::info!("Local blob store initialized at {}", root);
                Arc::new(store)
            }
            other => anyhow::bail!("Unknown storage.backend '{other}' (expected local or memory)"),
        };

        let coordinator = Arc::new(
            assets::AssetCoordinator::new(Arc::clone(&blobs))
                .with_allowed_types(config.catalog.allowed_content_types.clone()),
        );
        let catalog = Arc::new(
            Catalog::new(Arc::clone(&documents), coordinator)
                .with_collection(&config.catalog.collection),
        );

        Ok(Self {
            config,
            documents,
            blobs,
            catalog,
        })
    }
}

/// Create the parent directory of a database file if needed.
pub fn ensure_parent_dir(path: &str) -> anyhow::Result<()> {
    if path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
