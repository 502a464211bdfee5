//! Store-client layer: contracts and persistence implementations.
//!
//! # Responsibility
//! - Define typed contracts for the article store and the index store.
//! - Isolate SQLite query details from reconciliation logic.
//!
//! # Invariants
//! - Store APIs return semantic errors (`NotFound`, `Conflict`,
//!   `Unavailable`) in addition to DB transport errors.
//! - Not-found reads are `Ok(None)`, not errors.

pub mod article_repo;
pub mod index_repo;
