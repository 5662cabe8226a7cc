//! Document store handle.
//!
//! # Responsibility
//! - Own the SQLite connections and their open/close/reset lifecycle.
//! - Route writes through the single writer connection and reads through a
//!   small pool of query-only connections.
//! - Map repository failures into the caller-facing error taxonomy.
//! - Emit one structured log event per operation.
//!
//! # Invariants
//! - Connections are reachable only through this type's operations.
//! - Each read-check-write runs in one immediate transaction on the writer.
//! - File-backed reads never wait for the writer; WAL gives them the last
//!   committed state. In-memory stores read through the writer.
//! - `clear_all`, `close`, and `destroy` hold the lifecycle lock exclusively,
//!   so no operation straddles a reset.
//! - A failed reset leaves the handle closed, never half-open.

pub mod async_store;
pub mod error;
pub mod global;

use crate::config::StoreConfig;
use crate::db::{open_db, open_db_in_memory, open_db_reader, remove_db_files};
use crate::model::document::Document;
use crate::model::revision::Revision;
use crate::repo::document_repo::{
    ensure_document_connection_ready, DocumentRepository, RepoError, RepoResult,
    SqliteDocumentRepository, WritePolicy,
};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{
    Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError,
};
use std::time::Instant;

pub use error::{StorageFailure, StoreError, StoreErrorKind, StoreResult};

/// Query-only connections opened next to the writer of a file store.
const READ_CONNECTIONS: usize = 4;

/// Blocking, thread-safe document store.
#[derive(Debug)]
pub struct DocumentStore {
    config: StoreConfig,
    conns: RwLock<Option<Connections>>,
}

/// Connection set of one open store.
#[derive(Debug)]
struct Connections {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Connections {
    fn writer(&self) -> MutexGuard<'_, Connection> {
        lock(&self.writer)
    }

    /// Picks an idle reader, or queues on one when all are busy.
    fn reader(&self) -> MutexGuard<'_, Connection> {
        if self.readers.is_empty() {
            return self.writer();
        }

        let start = self.next_reader.fetch_add(1, Ordering::Relaxed);
        let count = self.readers.len();
        for offset in 0..count {
            match self.readers[(start + offset) % count].try_lock() {
                Ok(guard) => return guard,
                Err(TryLockError::Poisoned(poisoned)) => return poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {}
            }
        }
        lock(&self.readers[start % count])
    }
}

impl DocumentStore {
    /// Opens (creating if needed) the database described by `config`.
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        config.validate().map_err(|err| {
            StoreError::StorageUnavailable(StorageFailure::Config(err.to_string()))
        })?;
        let conns = connect(&config)?;
        Ok(Self {
            config,
            conns: RwLock::new(Some(conns)),
        })
    }

    /// Opens a fresh in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open(StoreConfig::in_memory())
    }

    /// Database file path; `None` for in-memory stores.
    pub fn path(&self) -> Option<PathBuf> {
        self.config.db_path()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Returns whether the handle currently holds open connections.
    pub fn is_open(&self) -> bool {
        self.shared().is_some()
    }

    /// Creates `doc` at revision generation 1 unless its id is taken.
    pub fn insert_if_absent(&self, doc: &Document) -> StoreResult<Document> {
        self.run("doc_insert", Some(&doc.id), Access::Write, |repo| {
            repo.insert_if_absent(doc)
        })
    }

    /// Creates or overwrites `doc`; existing ids require the current revision.
    pub fn upsert(&self, doc: &Document) -> StoreResult<Document> {
        self.run("doc_upsert", Some(&doc.id), Access::Write, |repo| {
            repo.upsert(doc, WritePolicy::RequireRevision)
        })
    }

    /// Like [`Self::upsert`], but a missing revision overwrites the stored
    /// version. A supplied stale revision is still a conflict.
    pub fn upsert_last_write_wins(&self, doc: &Document) -> StoreResult<Document> {
        self.run("doc_upsert", Some(&doc.id), Access::Write, |repo| {
            repo.upsert(doc, WritePolicy::LastWriteWins)
        })
    }

    /// Returns the current version of `id`, tombstoned or not.
    pub fn find_by_id(&self, id: &str) -> StoreResult<Document> {
        self.run("doc_get", Some(id), Access::Read, |repo| {
            repo.get_document(id)?
                .ok_or_else(|| RepoError::NotFound(id.to_string()))
        })
    }

    /// Returns live documents whose type equals `doc_type`.
    ///
    /// Callers must not rely on the order.
    pub fn find_by_type(&self, doc_type: &str) -> StoreResult<Vec<Document>> {
        self.run("doc_list", None, Access::Read, |repo| {
            repo.list_by_type(doc_type)
        })
    }

    /// Returns every stored document including tombstones, ordered by id.
    pub fn all_documents(&self) -> StoreResult<Vec<Document>> {
        self.run("doc_list_all", None, Access::Read, |repo| repo.list_all())
    }

    pub fn count_live_by_type(&self, doc_type: &str) -> StoreResult<u64> {
        self.run("doc_count", None, Access::Read, |repo| {
            repo.count_live_by_type(doc_type)
        })
    }

    /// Tombstones `id`. Re-tombstoning still advances the revision.
    pub fn soft_delete_by_id(&self, id: &str) -> StoreResult<Document> {
        self.run("doc_soft_delete", Some(id), Access::Write, |repo| {
            repo.soft_delete(id)
        })
    }

    /// Purges `id` and its revision history.
    pub fn hard_delete_by_id(&self, id: &str) -> StoreResult<()> {
        self.run("doc_hard_delete", Some(id), Access::Write, |repo| {
            repo.hard_delete(id)
        })
    }

    /// Purges every document and reopens an empty store.
    ///
    /// Works on a closed handle too; on failure the handle stays closed.
    pub fn clear_all(&self) -> StoreResult<()> {
        let started_at = Instant::now();
        let mut slot = self.exclusive();
        drop(slot.take());

        let result = self.reset_files().and_then(|()| connect(&self.config));
        match result {
            Ok(conns) => {
                *slot = Some(conns);
                info!(
                    "event=store_clear module=store status=ok duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=store_clear module=store status=error duration_ms={} error_code={} error={}",
                    started_at.elapsed().as_millis(),
                    err.code(),
                    err
                );
                Err(err)
            }
        }
    }

    /// Closes every connection. Later operations fail with
    /// `StorageUnavailable` until `clear_all` reopens the store.
    pub fn close(&self) {
        if self.exclusive().take().is_some() {
            info!("event=store_close module=store status=ok");
        }
    }

    /// Closes the handle and deletes the database files.
    pub fn destroy(&self) -> StoreResult<()> {
        let mut slot = self.exclusive();
        drop(slot.take());
        let result = self.reset_files();
        match &result {
            Ok(()) => info!("event=store_destroy module=store status=ok"),
            Err(err) => error!(
                "event=store_destroy module=store status=error error_code={} error={}",
                err.code(),
                err
            ),
        }
        result
    }

    fn reset_files(&self) -> StoreResult<()> {
        match self.config.db_path() {
            Some(path) => Ok(remove_db_files(&path)?),
            None => Ok(()),
        }
    }

    // A panic mid-operation drops its transaction, which rolls back, so the
    // connections behind a poisoned lock are still consistent.
    fn shared(&self) -> RwLockReadGuard<'_, Option<Connections>> {
        self.conns.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn exclusive(&self) -> RwLockWriteGuard<'_, Option<Connections>> {
        self.conns.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn run<T: LoggedRevision>(
        &self,
        event: &'static str,
        id: Option<&str>,
        access: Access,
        op: impl FnOnce(&SqliteDocumentRepository<'_>) -> RepoResult<T>,
    ) -> StoreResult<T> {
        let started_at = Instant::now();
        let slot = self.shared();
        let result = match slot.as_ref() {
            Some(conns) => {
                let conn = match access {
                    Access::Read => conns.reader(),
                    Access::Write => conns.writer(),
                };
                let repo = SqliteDocumentRepository::from_ready_connection(&conn);
                op(&repo).map_err(StoreError::from)
            }
            None => Err(StoreError::StorageUnavailable(StorageFailure::Closed)),
        };
        drop(slot);

        log_outcome(event, id, started_at, &result);
        result
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn connect(config: &StoreConfig) -> StoreResult<Connections> {
    let (writer, readers) = match config.db_path() {
        Some(path) => {
            let writer = open_db(&path, config.busy_timeout())?;
            ensure_document_connection_ready(&writer)?;
            let readers = (0..READ_CONNECTIONS)
                .map(|_| open_db_reader(&path, config.busy_timeout()).map(Mutex::new))
                .collect::<Result<Vec<_>, _>>()?;
            (writer, readers)
        }
        None => {
            let writer = open_db_in_memory()?;
            ensure_document_connection_ready(&writer)?;
            (writer, Vec::new())
        }
    };

    Ok(Connections {
        writer: Mutex::new(writer),
        readers,
        next_reader: AtomicUsize::new(0),
    })
}

/// Revision reported by an operation's success event.
trait LoggedRevision {
    fn logged_revision(&self) -> Option<&Revision> {
        None
    }
}

impl LoggedRevision for Document {
    fn logged_revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }
}

impl LoggedRevision for Vec<Document> {}
impl LoggedRevision for u64 {}
impl LoggedRevision for () {}

fn log_outcome<T: LoggedRevision>(
    event: &str,
    id: Option<&str>,
    started_at: Instant,
    result: &StoreResult<T>,
) {
    let id = id.unwrap_or("-");
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(value) => {
            let rev = value
                .logged_revision()
                .map_or_else(|| "-".to_string(), ToString::to_string);
            info!("event={event} module=store status=ok id={id} rev={rev} duration_ms={duration_ms}");
        }
        Err(err) if err.kind() == StoreErrorKind::StorageUnavailable => error!(
            "event={event} module=store status=error id={id} duration_ms={duration_ms} error_code={} error={err}",
            err.code()
        ),
        Err(err) => warn!(
            "event={event} module=store status=rejected id={id} duration_ms={duration_ms} error_code={} error={err}",
            err.code()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentStore, LoggedRevision, StorageFailure, StoreError};
    use crate::config::StoreConfig;
    use crate::model::document::Document;
    use std::sync::mpsc;
    use std::time::Duration;

    fn doc(id: &str) -> Document {
        Document::new(id, "DOC", id, "2024-01-01T00:00:00Z")
    }

    #[test]
    fn in_memory_store_has_no_path() {
        let store = DocumentStore::open_in_memory().unwrap();
        assert!(store.path().is_none());
        assert!(store.is_open());
    }

    #[test]
    fn closed_store_reports_storage_unavailable() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.close();
        store.close();

        let err = store.insert_if_absent(&doc("a1")).unwrap_err();
        assert!(matches!(
            err,
            StoreError::StorageUnavailable(StorageFailure::Closed)
        ));
    }

    #[test]
    fn clear_all_reopens_a_closed_in_memory_store() {
        let store = DocumentStore::open_in_memory().unwrap();
        store.insert_if_absent(&doc("a1")).unwrap();
        store.close();

        store.clear_all().unwrap();
        assert!(store.is_open());
        assert!(store.all_documents().unwrap().is_empty());
    }

    #[test]
    fn file_store_opens_reader_pool() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(StoreConfig::new(dir.path())).unwrap();

        let slot = store.shared();
        let conns = slot.as_ref().unwrap();
        assert_eq!(conns.readers.len(), super::READ_CONNECTIONS);
    }

    #[test]
    fn reads_of_other_ids_do_not_wait_for_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(StoreConfig::new(dir.path())).unwrap();
        store.insert_if_absent(&doc("b1")).unwrap();

        let slot = store.shared();
        let writer = slot.as_ref().unwrap().writer();

        let store = &store;
        let (tx, rx) = mpsc::channel();
        std::thread::scope(|scope| {
            scope.spawn(move || {
                let found = store.find_by_id("b1").map(|doc| doc.id);
                let listed = store.find_by_type("DOC").map(|docs| docs.len());
                let _ = tx.send((found, listed));
            });

            let outcome = rx.recv_timeout(Duration::from_secs(5));
            drop(writer);
            let (found, listed) = outcome.expect("read blocked behind the writer");
            assert_eq!(found.unwrap(), "b1");
            assert_eq!(listed.unwrap(), 1);
        });
    }

    #[test]
    fn reader_connections_refuse_writes() {
        let dir = tempfile::tempdir().unwrap();
        let store = DocumentStore::open(StoreConfig::new(dir.path())).unwrap();

        let slot = store.shared();
        let reader = slot.as_ref().unwrap().reader();
        assert!(reader.execute("DELETE FROM documents;", []).is_err());
    }

    #[test]
    fn success_events_carry_the_stored_revision() {
        let store = DocumentStore::open_in_memory().unwrap();
        let stored = store.insert_if_absent(&doc("a1")).unwrap();

        assert_eq!(stored.logged_revision(), stored.revision.as_ref());
        assert!(vec![stored.clone()].logged_revision().is_none());
        assert!(().logged_revision().is_none());
    }
}
