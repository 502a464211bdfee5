//! View-count synchronization engine.
//!
//! Applies "article viewed" events to the authoritative article store and to
//! the denormalized, paginated article index, and reports per event whether
//! the triggering message may be acknowledged.

pub mod clock;
pub mod config;
pub mod db;
pub mod index;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, SyncConfig};
pub use index::projector::project_metadata;
pub use index::resolver::resolve_position;
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::article::{Article, ArticleId, ArticleValidationError, ContentBlock};
pub use model::event::ViewEvent;
pub use model::index::{ArticleIndex, ArticleMetadata, IndexPage, IndexPosition};
pub use repo::article_repo::{ArticleStore, RepoError, RepoResult, SqliteArticleStore};
pub use repo::index_repo::{IndexStore, SqliteIndexStore};
pub use service::consumer::{BatchReport, BatchResponse, EventFailure, ViewEventConsumer};
pub use service::publish_service::{PublishError, PublishReceipt, PublishService};
pub use service::reconciler::{
    ReconcileOutcome, ReconcileReport, Reconciler, SyncError, SyncStage,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
