//! Domain model for stored documents.
//!
//! # Responsibility
//! - Define the single persisted record shape and its version token.
//! - Provide lifecycle helpers for soft-delete semantics.
//!
//! # Invariants
//! - Every document is identified by a caller-assigned `DocumentId`.
//! - Revisions are minted by the store only; callers echo them back.

pub mod document;
pub mod revision;
