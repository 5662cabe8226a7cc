//! Document domain model.
//!
//! # Responsibility
//! - Define the persisted record shared by every list view.
//! - Provide lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - `id` is caller-assigned, opaque to the store, and never changes for the
//!   document lifetime.
//! - `revision` is `None` until the store has persisted the document.
//! - `deleted` is the source of truth for tombstone state.

use crate::model::revision::Revision;
use serde::{Deserialize, Serialize};

/// Caller-assigned document identifier.
///
/// Kept as a type alias to make semantic intent explicit in signatures.
pub type DocumentId = String;

/// One stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Version this copy was read at; `None` for never-saved documents.
    #[serde(rename = "rev", default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<Revision>,
    /// Free-form class tag used by listing filters.
    #[serde(rename = "type")]
    pub doc_type: String,
    pub title: String,
    /// ISO-8601 creation timestamp supplied by the caller.
    pub created: String,
    #[serde(default)]
    pub deleted: bool,
}

impl Document {
    /// Builds an unsaved, live document.
    pub fn new(
        id: impl Into<DocumentId>,
        doc_type: impl Into<String>,
        title: impl Into<String>,
        created: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            revision: None,
            doc_type: doc_type.into(),
            title: title.into(),
            created: created.into(),
            deleted: false,
        }
    }

    /// Marks this document as tombstoned.
    pub fn soft_delete(&mut self) {
        self.deleted = true;
    }

    /// Clears the tombstone flag.
    pub fn restore(&mut self) {
        self.deleted = false;
    }

    /// Returns whether this document is visible to listing reads.
    pub fn is_active(&self) -> bool {
        !self.deleted
    }
}
