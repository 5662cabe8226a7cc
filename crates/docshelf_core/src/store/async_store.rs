//! Async facade over [`DocumentStore`].
//!
//! # Responsibility
//! - Run blocking SQLite work on tokio's blocking pool.
//! - Make `clear_all`/`destroy` a barrier against every other operation.
//!
//! # Invariants
//! - Regular operations hold a shared gate guard until their blocking work
//!   returns, even when the awaiting future is dropped.
//! - Reset operations hold the exclusive guard; the gate is FIFO-fair, so
//!   operations requested before a reset finish first and operations
//!   requested after it see the empty store.

use super::{DocumentStore, StoreResult};
use crate::config::StoreConfig;
use crate::model::document::Document;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Cloneable async handle to one document store.
#[derive(Debug, Clone)]
pub struct AsyncDocumentStore {
    inner: Arc<DocumentStore>,
    gate: Arc<RwLock<()>>,
}

impl AsyncDocumentStore {
    /// Opens the store on the blocking pool.
    pub async fn open(config: StoreConfig) -> StoreResult<Self> {
        let store = tokio::task::spawn_blocking(move || DocumentStore::open(config)).await??;
        Ok(Self::from_store(store))
    }

    pub fn from_store(store: DocumentStore) -> Self {
        Self {
            inner: Arc::new(store),
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.inner.path()
    }

    pub async fn insert_if_absent(&self, doc: Document) -> StoreResult<Document> {
        self.shared(move |store| store.insert_if_absent(&doc)).await
    }

    pub async fn upsert(&self, doc: Document) -> StoreResult<Document> {
        self.shared(move |store| store.upsert(&doc)).await
    }

    pub async fn upsert_last_write_wins(&self, doc: Document) -> StoreResult<Document> {
        self.shared(move |store| store.upsert_last_write_wins(&doc))
            .await
    }

    pub async fn find_by_id(&self, id: impl Into<String>) -> StoreResult<Document> {
        let id = id.into();
        self.shared(move |store| store.find_by_id(&id)).await
    }

    pub async fn find_by_type(&self, doc_type: impl Into<String>) -> StoreResult<Vec<Document>> {
        let doc_type = doc_type.into();
        self.shared(move |store| store.find_by_type(&doc_type)).await
    }

    pub async fn all_documents(&self) -> StoreResult<Vec<Document>> {
        self.shared(|store| store.all_documents()).await
    }

    pub async fn count_live_by_type(&self, doc_type: impl Into<String>) -> StoreResult<u64> {
        let doc_type = doc_type.into();
        self.shared(move |store| store.count_live_by_type(&doc_type))
            .await
    }

    pub async fn soft_delete_by_id(&self, id: impl Into<String>) -> StoreResult<Document> {
        let id = id.into();
        self.shared(move |store| store.soft_delete_by_id(&id)).await
    }

    pub async fn hard_delete_by_id(&self, id: impl Into<String>) -> StoreResult<()> {
        let id = id.into();
        self.shared(move |store| store.hard_delete_by_id(&id)).await
    }

    /// Purges every document; waits for in-flight operations first.
    pub async fn clear_all(&self) -> StoreResult<()> {
        self.exclusive(|store| store.clear_all()).await
    }

    pub async fn close(&self) -> StoreResult<()> {
        self.exclusive(|store| {
            store.close();
            Ok(())
        })
        .await
    }

    pub async fn destroy(&self) -> StoreResult<()> {
        self.exclusive(|store| store.destroy()).await
    }

    async fn shared<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentStore) -> StoreResult<T> + Send + 'static,
    {
        let guard = Arc::clone(&self.gate).read_owned().await;
        let store = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op(&store)
        })
        .await?
    }

    async fn exclusive<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DocumentStore) -> StoreResult<T> + Send + 'static,
    {
        let guard = Arc::clone(&self.gate).write_owned().await;
        let store = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op(&store)
        })
        .await?
    }
}
