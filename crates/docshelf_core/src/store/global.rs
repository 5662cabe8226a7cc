//! Process-wide store handle.
//!
//! # Responsibility
//! - Hold the one store a host process opens at startup.
//! - Hand out clones of the async handle, never the connection itself.
//!
//! # Invariants
//! - The handle is opened at most once per process.
//! - Re-opening with the same database location is idempotent.
//! - Re-opening with a different location is rejected.
//! - Resets go through `clear_all`, which keeps the same handle alive.

use super::async_store::AsyncDocumentStore;
use super::{DocumentStore, StoreError};
use crate::config::StoreConfig;
use log::info;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

static GLOBAL_STORE: OnceCell<AsyncDocumentStore> = OnceCell::new();

#[derive(Debug)]
pub enum GlobalStoreError {
    /// A store at another location is already installed.
    AlreadyOpen {
        active: Option<PathBuf>,
        requested: Option<PathBuf>,
    },
    Store(StoreError),
}

impl Display for GlobalStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyOpen { active, requested } => write!(
                f,
                "global store already open at `{}`; refusing to switch to `{}`",
                display_location(active),
                display_location(requested)
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GlobalStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::AlreadyOpen { .. } => None,
            Self::Store(err) => Some(err),
        }
    }
}

impl From<StoreError> for GlobalStoreError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Opens the process-wide store, or returns it when already open at the
/// same location.
///
/// Blocking: call it during startup, outside async contexts.
pub fn open_global(config: StoreConfig) -> Result<AsyncDocumentStore, GlobalStoreError> {
    let requested = config.db_path();
    let in_memory = config.in_memory;

    let store = GLOBAL_STORE.get_or_try_init(|| -> Result<_, GlobalStoreError> {
        let store = DocumentStore::open(config)?;
        info!(
            "event=global_store_open module=store status=ok mode={}",
            if in_memory { "memory" } else { "file" }
        );
        Ok(AsyncDocumentStore::from_store(store))
    })?;

    let active = store.path();
    if active != requested {
        return Err(GlobalStoreError::AlreadyOpen { active, requested });
    }

    Ok(store.clone())
}

/// Returns the process-wide store when it has been opened.
pub fn global() -> Option<AsyncDocumentStore> {
    GLOBAL_STORE.get().cloned()
}

fn display_location(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
}
