//! Store-level error taxonomy.
//!
//! Callers see three kinds only; repository and database details are kept as
//! `source()` chains for diagnostics.

use crate::db::DbError;
use crate::model::document::DocumentId;
use crate::repo::document_repo::{ConflictReason, RepoError};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type StoreResult<T> = Result<T, StoreError>;

/// Coarse failure class for caller-side handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    NotFound,
    Conflict,
    StorageUnavailable,
}

/// Why the storage medium could not serve an operation.
#[derive(Debug)]
pub enum StorageFailure {
    /// The handle was closed or destroyed.
    Closed,
    /// The configuration cannot describe a usable database location.
    Config(String),
    /// Open, read, write, or file removal failed.
    Db(DbError),
    /// The database does not carry the expected schema.
    Schema(String),
    /// A persisted row could not be decoded.
    Corrupted(String),
    /// The blocking worker running the operation died.
    WorkerFailed(String),
}

impl Display for StorageFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "store is closed"),
            Self::Config(message) => write!(f, "invalid store config: {message}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Schema(message) => write!(f, "schema mismatch: {message}"),
            Self::Corrupted(message) => write!(f, "corrupted data: {message}"),
            Self::WorkerFailed(message) => write!(f, "storage worker failed: {message}"),
        }
    }
}

#[derive(Debug)]
pub enum StoreError {
    NotFound(DocumentId),
    Conflict {
        id: DocumentId,
        reason: ConflictReason,
    },
    StorageUnavailable(StorageFailure),
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            Self::NotFound(_) => StoreErrorKind::NotFound,
            Self::Conflict { .. } => StoreErrorKind::Conflict,
            Self::StorageUnavailable(_) => StoreErrorKind::StorageUnavailable,
        }
    }

    /// Stable short code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(id) => write!(f, "document not found: {id}"),
            Self::Conflict { id, reason } => write!(f, "conflict on document {id}: {reason}"),
            Self::StorageUnavailable(failure) => write!(f, "storage unavailable: {failure}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StorageUnavailable(StorageFailure::Db(err)) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::StorageUnavailable(StorageFailure::Db(value))
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Db(err) => Self::StorageUnavailable(StorageFailure::Db(err)),
            RepoError::NotFound(id) => Self::NotFound(id),
            RepoError::Conflict { id, reason } => Self::Conflict { id, reason },
            RepoError::InvalidData(message) => {
                Self::StorageUnavailable(StorageFailure::Corrupted(message))
            }
            schema @ (RepoError::UninitializedConnection { .. }
            | RepoError::MissingRequiredTable(_)
            | RepoError::MissingRequiredColumn { .. }) => {
                Self::StorageUnavailable(StorageFailure::Schema(schema.to_string()))
            }
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(value: tokio::task::JoinError) -> Self {
        Self::StorageUnavailable(StorageFailure::WorkerFailed(value.to_string()))
    }
}
