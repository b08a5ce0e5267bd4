//! In-memory document store.
//!
//! Stores all records in memory with no persistence. Useful for testing
//! and ephemeral deployments. Uses `RwLock<HashMap>` for thread-safe access.
//! Native order is insertion order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;

use super::store::{generate_document_id, Document, DocumentStore, Query, StoredDocument};

pub struct MemoryDocumentStore {
    /// collection name -> records in insertion order.
    collections: RwLock<HashMap<String, Vec<StoredDocument>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Number of records in `collection`.
    pub fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().expect("rwlock poisoned");
        collections.get(collection).map_or(0, Vec::len)
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn insert(
        &self,
        collection: &str,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        let collection = collection.to_string();
        Box::pin(async move {
            let id = generate_document_id();
            let mut collections = self.collections.write().expect("rwlock poisoned");
            collections.entry(collection).or_default().push(StoredDocument {
                id: id.clone(),
                fields: document,
            });
            Ok(id)
        })
    }

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredDocument>>> + Send + '_>> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let collections = self.collections.read().expect("rwlock poisoned");
            Ok(collections
                .get(&collection)
                .and_then(|docs| docs.iter().find(|d| d.id == id))
                .cloned())
        })
    }

    fn query(
        &self,
        collection: &str,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<StoredDocument>>> + Send + '_>> {
        let collection = collection.to_string();
        Box::pin(async move {
            let mut matched: Vec<StoredDocument> = {
                let collections = self.collections.read().expect("rwlock poisoned");
                collections
                    .get(&collection)
                    .map(|docs| {
                        docs.iter()
                            .filter(|d| query.matches(&d.fields))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default()
            };
            query.sort(&mut matched);
            Ok(matched)
        })
    }

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        let collection = collection.to_string();
        let id = id.to_string();
        Box::pin(async move {
            let mut collections = self.collections.write().expect("rwlock poisoned");
            let Some(docs) = collections.get_mut(&collection) else {
                return Ok(false);
            };
            let before = docs.len();
            docs.retain(|d| d.id != id);
            Ok(docs.len() != before)
        })
    }
}
