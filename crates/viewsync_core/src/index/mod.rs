//! Pure index helpers: position lookup and metadata projection.
//!
//! # Responsibility
//! - Locate an article's (page, slot) inside a paginated index.
//! - Derive the listing projection of an article.
//!
//! # Invariants
//! - Nothing in this module performs I/O or mutates shared state.

pub mod projector;
pub mod resolver;
