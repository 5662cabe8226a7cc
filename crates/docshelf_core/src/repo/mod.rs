//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the data access contract for stored documents.
//! - Isolate SQLite query details from store lifecycle and locking.
//!
//! # Invariants
//! - Connection readiness is checked once, not per query.
//! - Repository APIs return semantic errors (`NotFound`, `Conflict`) in
//!   addition to DB transport errors.

pub mod document_repo;
