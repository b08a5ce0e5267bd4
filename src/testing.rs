//! Test doubles shared by the unit tests of the core modules.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};

use crate::errors::CatalogError;
use crate::identity::provider::{Identity, IdentityChange, IdentityChanges, IdentityProvider};
use crate::metadata::memory::MemoryDocumentStore;
use crate::metadata::store::{Document, DocumentStore, Query, StoredDocument};
use crate::storage::backend::BlobStore;
use crate::storage::memory::MemoryBlobStore;

// ── Blob store ──────────────────────────────────────────────────────

/// Memory blob store with injectable faults and per-payload put gates.
#[derive(Default)]
pub struct FaultyBlobStore {
    pub inner: MemoryBlobStore,
    failing_deletes: Mutex<HashSet<String>>,
    fail_puts: AtomicBool,
    gates: Mutex<HashMap<Vec<u8>, Arc<Notify>>>,
    calls: AtomicUsize,
}

impl FaultyBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delete of `key` fail.
    pub fn fail_delete(&self, key: &str) {
        self.failing_deletes
            .lock()
            .expect("mutex poisoned")
            .insert(key.to_string());
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    /// Hold any put whose payload equals `data` until the returned handle
    /// is notified.
    pub fn gate_put(&self, data: &[u8]) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .expect("mutex poisoned")
            .insert(data.to_vec(), Arc::clone(&gate));
        gate
    }

    /// Number of trait calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl BlobStore for FaultyBlobStore {
    fn put(
        &self,
        key: &str,
        data: Bytes,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        self.record();
        let key = key.to_string();
        let gate = self
            .gates
            .lock()
            .expect("mutex poisoned")
            .get(data.as_ref())
            .cloned();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            if self.fail_puts.load(Ordering::SeqCst) {
                anyhow::bail!("injected put failure for {key}");
            }
            self.inner.put(&key, data).await
        })
    }

    fn get(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Bytes>>> + Send + '_>> {
        self.record();
        self.inner.get(key)
    }

    fn delete(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        self.record();
        let failing = self
            .failing_deletes
            .lock()
            .expect("mutex poisoned")
            .contains(key);
        let key = key.to_string();
        Box::pin(async move {
            if failing {
                anyhow::bail!("injected delete failure for {key}");
            }
            self.inner.delete(&key).await
        })
    }

    fn exists(
        &self,
        key: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        self.inner.exists(key)
    }

    fn url_for(&self, key: &str) -> String {
        self.inner.url_for(key)
    }
}

// ── Document store ──────────────────────────────────────────────────

/// Memory document store that counts calls and can fail writes.
#[derive(Default)]
pub struct CountingDocumentStore {
    pub inner: MemoryDocumentStore,
    calls: AtomicUsize,
    fail_deletes: AtomicBool,
    fail_inserts_after_write: AtomicBool,
}

impl CountingDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_deletes(&self) {
        self.fail_deletes.store(true, Ordering::SeqCst);
    }

    /// Store inserted documents but report every insert as failed.
    pub fn fail_inserts_after_write(&self) {
        self.fail_inserts_after_write.store(true, Ordering::SeqCst);
    }

    fn record(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl DocumentStore for CountingDocumentStore {
    fn insert(
        &self,
        collection: &str,
        document: Document,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + '_>> {
        self.record();
        let write = self.inner.insert(collection, document);
        let fail = self.fail_inserts_after_write.load(Ordering::SeqCst);
        Box::pin(async move {
            let id = write.await?;
            if fail {
                anyhow::bail!("connection reset after writing {id}");
            }
            Ok(id)
        })
    }

    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredDocument>>> + Send + '_>> {
        self.record();
        self.inner.get(collection, id)
    }

    fn query(
        &self,
        collection: &str,
        query: Query,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Vec<StoredDocument>>> + Send + '_>> {
        self.record();
        self.inner.query(collection, query)
    }

    fn delete(
        &self,
        collection: &str,
        id: &str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<bool>> + Send + '_>> {
        self.record();
        if self.fail_deletes.load(Ordering::SeqCst) {
            let id = id.to_string();
            return Box::pin(async move { anyhow::bail!("injected delete failure for {id}") });
        }
        self.inner.delete(collection, id)
    }
}

// ── Identity provider ───────────────────────────────────────────────

/// Identity provider whose change stream is driven by the test.
pub struct ScriptedIdentityProvider {
    tx: mpsc::UnboundedSender<IdentityChange>,
    rx: Mutex<Option<IdentityChanges>>,
    fail_subscribe: AtomicBool,
    fail_sign_out: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedIdentityProvider {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            fail_subscribe: AtomicBool::new(false),
            fail_sign_out: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Push a message onto the change stream.  Ignored once the
    /// subscriber has gone away.
    pub async fn emit(&self, change: IdentityChange) {
        self.push(change);
        tokio::task::yield_now().await;
    }

    /// Queue a message without giving the listener a chance to run.
    pub fn push(&self, change: IdentityChange) {
        let _ = self.tx.send(change);
    }

    pub fn fail_subscribe(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    pub fn fail_sign_out(&self) {
        self.fail_sign_out.store(true, Ordering::SeqCst);
    }

    /// Number of credential operations requested.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn scripted_identity(email: &str) -> Identity {
        Identity {
            uid: format!("uid-{}", email.split('@').next().unwrap_or(email)),
            display_name: String::new(),
            email: email.to_string(),
        }
    }
}

impl IdentityProvider for ScriptedIdentityProvider {
    fn sign_in(
        &self,
        email: &str,
        _password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let identity = Self::scripted_identity(email);
        Box::pin(async move { Ok(identity) })
    }

    fn sign_up(
        &self,
        email: &str,
        _password: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let identity = Self::scripted_identity(email);
        Box::pin(async move { Ok(identity) })
    }

    fn sign_out(&self) -> Pin<Box<dyn Future<Output = Result<(), CatalogError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_sign_out.load(Ordering::SeqCst);
        Box::pin(async move {
            if fail {
                return Err(CatalogError::StoreUnavailable(anyhow::anyhow!(
                    "identity service unreachable"
                )));
            }
            Ok(())
        })
    }

    fn update_display_name(
        &self,
        identity: &Identity,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Identity, CatalogError>> + Send + '_>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let renamed = Identity {
            display_name: name.to_string(),
            ..identity.clone()
        };
        Box::pin(async move { Ok(renamed) })
    }

    fn subscribe(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<IdentityChanges, CatalogError>> + Send + '_>> {
        Box::pin(async move {
            if self.fail_subscribe.load(Ordering::SeqCst) {
                return Err(CatalogError::StoreUnavailable(anyhow::anyhow!(
                    "identity service unreachable"
                )));
            }
            self.rx
                .lock()
                .expect("mutex poisoned")
                .take()
                .ok_or_else(|| CatalogError::validation("already subscribed"))
        })
    }
}

/// A seller identity for tests.
pub fn seller(uid: &str, name: &str) -> Identity {
    Identity {
        uid: uid.to_string(),
        display_name: name.to_string(),
        email: format!("{uid}@example.com"),
    }
}
