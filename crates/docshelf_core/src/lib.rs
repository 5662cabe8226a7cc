//! Local document store core.
//! This crate owns the persistence invariants for list documents: identity,
//! revision-checked writes, tombstones, purges, and whole-store reset.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::document::{Document, DocumentId};
pub use model::revision::{Revision, RevisionParseError};
pub use repo::document_repo::{
    ensure_document_connection_ready, ConflictReason, DocumentRepository, RepoError, RepoResult,
    SqliteDocumentRepository, WritePolicy,
};
pub use store::async_store::AsyncDocumentStore;
pub use store::global::{global, open_global, GlobalStoreError};
pub use store::{DocumentStore, StorageFailure, StoreError, StoreErrorKind, StoreResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
