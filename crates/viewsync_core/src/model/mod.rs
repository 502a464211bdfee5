//! Domain model for article records, the paginated index and view events.
//!
//! # Responsibility
//! - Define canonical data structures used by reconciliation logic.
//! - Keep wire naming (`firstPublished`, `type`, ...) in one place.
//!
//! # Invariants
//! - Every article is identified by a stable `ArticleId`, never by timestamp.
//! - Index entries are keyed by the same `ArticleId` as their article.

pub mod article;
pub mod event;
pub mod index;
