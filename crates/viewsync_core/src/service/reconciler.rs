//! View-count reconciliation of one article.
//!
//! # Responsibility
//! - Apply one view event to the article store, then fold the resulting
//!   state into the paginated index.
//! - Classify the result so callers know whether the event may be
//!   acknowledged.
//!
//! # Invariants
//! - Stages run strictly in order: fetch article, fetch index, resolve
//!   position, increment views, project metadata, write index. A stage runs
//!   only when every earlier stage succeeded.
//! - The article store is written before the index; the index may lag the
//!   article record but never leads it.
//! - The view increment happens at most once per call, even when the index
//!   page write is retried after a version conflict.
//! - Not idempotent: two calls for one id add two views.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::index::projector::project_metadata;
use crate::index::resolver::resolve_position;
use crate::model::article::{Article, ArticleId};
use crate::model::index::{ArticleIndex, IndexPosition};
use crate::repo::article_repo::{ArticleStore, RepoError};
use crate::repo::index_repo::IndexStore;
use log::{error, info, warn};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Ordered reconciliation stages, plus event parsing done by the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    ParseEvent,
    FetchArticle,
    FetchIndex,
    ResolvePosition,
    IncrementViews,
    ProjectMetadata,
    WriteIndex,
}

impl SyncStage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseEvent => "parse_event",
            Self::FetchArticle => "fetch_article",
            Self::FetchIndex => "fetch_index",
            Self::ResolvePosition => "resolve_position",
            Self::IncrementViews => "increment_views",
            Self::ProjectMetadata => "project_metadata",
            Self::WriteIndex => "write_index",
        }
    }
}

impl Display for SyncStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reconciliation error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Event body is not a usable article id. Terminal.
    InvalidEvent { body: String, message: String },
    /// No article record, or no index entry for it. Terminal.
    ArticleNotFound {
        article_id: ArticleId,
        stage: SyncStage,
    },
    /// Article store read did not complete. Retryable.
    ArticleReadFailed {
        article_id: ArticleId,
        message: String,
    },
    /// Singleton index document is missing. Aborts the batch.
    ArticleIndexNotFound { index_id: String },
    /// Index store read did not complete. Aborts the batch.
    ArticleIndexReadFailed { index_id: String, message: String },
    /// View increment was not confirmed. Retryable; index untouched.
    ArticleUploadFailed {
        article_id: ArticleId,
        message: String,
    },
    /// Index write was not confirmed after the increment succeeded.
    /// Retryable; the index entry stays stale until redelivery.
    ArticleIndexUploadFailed {
        article_id: ArticleId,
        index_id: String,
        message: String,
    },
}

impl SyncError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidEvent { .. } => "invalid_event",
            Self::ArticleNotFound { .. } => "article_not_found",
            Self::ArticleReadFailed { .. } => "article_read_failed",
            Self::ArticleIndexNotFound { .. } => "article_index_not_found",
            Self::ArticleIndexReadFailed { .. } => "article_index_read_failed",
            Self::ArticleUploadFailed { .. } => "article_upload_failed",
            Self::ArticleIndexUploadFailed { .. } => "article_index_upload_failed",
        }
    }

    pub fn stage(&self) -> SyncStage {
        match self {
            Self::InvalidEvent { .. } => SyncStage::ParseEvent,
            Self::ArticleNotFound { stage, .. } => *stage,
            Self::ArticleReadFailed { .. } => SyncStage::FetchArticle,
            Self::ArticleIndexNotFound { .. } | Self::ArticleIndexReadFailed { .. } => {
                SyncStage::FetchIndex
            }
            Self::ArticleUploadFailed { .. } => SyncStage::IncrementViews,
            Self::ArticleIndexUploadFailed { .. } => SyncStage::WriteIndex,
        }
    }

    /// Whether redelivering the event can change the result.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ArticleReadFailed { .. }
                | Self::ArticleIndexReadFailed { .. }
                | Self::ArticleUploadFailed { .. }
                | Self::ArticleIndexUploadFailed { .. }
        )
    }

    /// Whether no event of the batch can be reconciled after this error.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::ArticleIndexNotFound { .. } | Self::ArticleIndexReadFailed { .. }
        )
    }

    pub fn article_id(&self) -> Option<&ArticleId> {
        match self {
            Self::ArticleNotFound { article_id, .. }
            | Self::ArticleReadFailed { article_id, .. }
            | Self::ArticleUploadFailed { article_id, .. }
            | Self::ArticleIndexUploadFailed { article_id, .. } => Some(article_id),
            Self::InvalidEvent { .. }
            | Self::ArticleIndexNotFound { .. }
            | Self::ArticleIndexReadFailed { .. } => None,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEvent { body, message } => {
                write!(f, "invalid event body `{body}`: {message}")
            }
            Self::ArticleNotFound { article_id, stage } => match stage {
                SyncStage::ResolvePosition => {
                    write!(f, "article {article_id} has no entry in the article index")
                }
                _ => write!(f, "article not found: {article_id}"),
            },
            Self::ArticleReadFailed {
                article_id,
                message,
            } => write!(f, "failed to read article {article_id}: {message}"),
            Self::ArticleIndexNotFound { index_id } => {
                write!(f, "article index not found: {index_id}")
            }
            Self::ArticleIndexReadFailed { index_id, message } => {
                write!(f, "failed to read article index {index_id}: {message}")
            }
            Self::ArticleUploadFailed {
                article_id,
                message,
            } => write!(f, "failed to upload article {article_id}: {message}"),
            Self::ArticleIndexUploadFailed {
                article_id,
                index_id,
                message,
            } => write!(
                f,
                "failed to upload article index {index_id} for article {article_id}: {message}"
            ),
        }
    }
}

impl Error for SyncError {}

/// Details of one successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub article_id: ArticleId,
    pub position: IndexPosition,
    /// Article view count after the increment.
    pub views: u64,
    /// Version of the index page after this event was folded in.
    pub page_version: u64,
    /// Conditional page-write attempts used.
    pub index_write_attempts: u32,
}

/// Per-event result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Success(ReconcileReport),
    /// Terminal: article or its index entry does not exist.
    NotFound(SyncError),
    /// Retryable: article read did not complete; nothing was written.
    StoreReadFailed(SyncError),
    /// Retryable: a store write did not confirm success.
    StoreWriteFailed(SyncError),
}

impl ReconcileOutcome {
    fn from_error(err: SyncError) -> Result<Self, SyncError> {
        match err {
            err if err.is_batch_fatal() => Err(err),
            err @ (SyncError::ArticleNotFound { .. } | SyncError::InvalidEvent { .. }) => {
                Ok(Self::NotFound(err))
            }
            err @ SyncError::ArticleReadFailed { .. } => Ok(Self::StoreReadFailed(err)),
            err => Ok(Self::StoreWriteFailed(err)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Whether the triggering event may be removed from the transport.
    pub fn should_acknowledge(&self) -> bool {
        matches!(self, Self::Success(_) | Self::NotFound(_))
    }

    pub fn error(&self) -> Option<&SyncError> {
        match self {
            Self::Success(_) => None,
            Self::NotFound(err) | Self::StoreReadFailed(err) | Self::StoreWriteFailed(err) => {
                Some(err)
            }
        }
    }
}

/// Reconciles view events against injected store clients.
pub struct Reconciler<A, I, C> {
    article_store: A,
    index_store: I,
    clock: C,
    config: SyncConfig,
}

impl<A: ArticleStore, I: IndexStore, C: Clock> Reconciler<A, I, C> {
    pub fn new(article_store: A, index_store: I, clock: C, config: SyncConfig) -> Self {
        Self {
            article_store,
            index_store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Reconciles one view of `article_id`.
    ///
    /// # Errors
    /// - Returns `Err` only for batch-fatal conditions (index missing or
    ///   unreadable). Every per-event failure is an `Ok` outcome.
    pub fn reconcile(&self, article_id: &ArticleId) -> Result<ReconcileOutcome, SyncError> {
        let started_at = Instant::now();
        match self.run(article_id) {
            Ok(report) => {
                info!(
                    "event=reconcile module=reconciler status=ok article_id={} page={} slot={} views={} page_version={} attempts={} duration_ms={}",
                    article_id,
                    report.position.page,
                    report.position.slot,
                    report.views,
                    report.page_version,
                    report.index_write_attempts,
                    started_at.elapsed().as_millis()
                );
                Ok(ReconcileOutcome::Success(report))
            }
            Err(err) => {
                let duration_ms = started_at.elapsed().as_millis();
                if err.is_retryable() {
                    error!(
                        "event=reconcile module=reconciler status=error article_id={} stage={} error_code={} duration_ms={} error={}",
                        article_id,
                        err.stage(),
                        err.code(),
                        duration_ms,
                        err
                    );
                } else {
                    warn!(
                        "event=reconcile module=reconciler status=error article_id={} stage={} error_code={} duration_ms={}",
                        article_id,
                        err.stage(),
                        err.code(),
                        duration_ms
                    );
                }
                ReconcileOutcome::from_error(err)
            }
        }
    }

    fn run(&self, article_id: &ArticleId) -> Result<ReconcileReport, SyncError> {
        self.fetch_article(article_id)?;
        let index = self.fetch_index()?;
        let position = self.resolve(&index, article_id)?;
        let updated = self.increment_views(article_id)?;
        self.write_index(index, position, &updated)
    }

    fn fetch_article(&self, article_id: &ArticleId) -> Result<Article, SyncError> {
        match self.article_store.get_article(article_id) {
            Ok(Some(article)) => Ok(article),
            Ok(None) => Err(SyncError::ArticleNotFound {
                article_id: article_id.clone(),
                stage: SyncStage::FetchArticle,
            }),
            Err(err) => Err(SyncError::ArticleReadFailed {
                article_id: article_id.clone(),
                message: err.to_string(),
            }),
        }
    }

    fn fetch_index(&self) -> Result<ArticleIndex, SyncError> {
        let index_id = self.config.index_id.as_str();
        match self.index_store.get_index(index_id) {
            Ok(Some(index)) => Ok(index),
            Ok(None) => Err(SyncError::ArticleIndexNotFound {
                index_id: index_id.to_string(),
            }),
            Err(err) => Err(SyncError::ArticleIndexReadFailed {
                index_id: index_id.to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn resolve(
        &self,
        index: &ArticleIndex,
        article_id: &ArticleId,
    ) -> Result<IndexPosition, SyncError> {
        resolve_position(index, article_id).ok_or_else(|| SyncError::ArticleNotFound {
            article_id: article_id.clone(),
            stage: SyncStage::ResolvePosition,
        })
    }

    fn increment_views(&self, article_id: &ArticleId) -> Result<Article, SyncError> {
        match self
            .article_store
            .increment_views(article_id, self.clock.now_ms())
        {
            Ok(article) => Ok(article),
            Err(RepoError::NotFound(_)) => Err(SyncError::ArticleNotFound {
                article_id: article_id.clone(),
                stage: SyncStage::IncrementViews,
            }),
            Err(err) => Err(SyncError::ArticleUploadFailed {
                article_id: article_id.clone(),
                message: err.to_string(),
            }),
        }
    }

    /// Projects `updated` into its slot and conditionally writes that page.
    ///
    /// On a version conflict the index is re-read and the position
    /// re-resolved before the next attempt.
    fn write_index(
        &self,
        mut index: ArticleIndex,
        mut position: IndexPosition,
        updated: &Article,
    ) -> Result<ReconcileReport, SyncError> {
        let metadata = project_metadata(updated);
        let attempts = self.config.index_write_attempts.max(1);
        let mut attempt = 1;

        loop {
            if !index.replace_entry(position, metadata.clone()) {
                return Err(
                    self.index_upload_failed(updated, "resolved position is outside the index")
                );
            }
            let written = self.index_store.put_page(
                index.id.as_str(),
                position.page,
                &index.body[position.page],
                updated.last_modified,
            );
            match written {
                Ok(version) => return Ok(self.report(updated, position, version, attempt)),
                Err(RepoError::Conflict { .. }) if attempt < attempts => {
                    warn!(
                        "event=index_write module=reconciler status=conflict article_id={} page={} attempt={}",
                        updated.id, position.page, attempt
                    );
                    attempt += 1;
                    index = self.refetch_index(updated)?;
                    position = resolve_position(&index, &updated.id).ok_or_else(|| {
                        self.index_upload_failed(updated, "index entry disappeared during retry")
                    })?;
                }
                Err(err) => return Err(self.index_upload_failed(updated, &err.to_string())),
            }
        }
    }

    fn refetch_index(&self, updated: &Article) -> Result<ArticleIndex, SyncError> {
        self.fetch_index()
            .map_err(|err| self.index_upload_failed(updated, &err.to_string()))
    }

    fn index_upload_failed(&self, updated: &Article, message: &str) -> SyncError {
        SyncError::ArticleIndexUploadFailed {
            article_id: updated.id.clone(),
            index_id: self.config.index_id.clone(),
            message: message.to_string(),
        }
    }

    fn report(
        &self,
        updated: &Article,
        position: IndexPosition,
        page_version: u64,
        attempts: u32,
    ) -> ReconcileReport {
        ReconcileReport {
            article_id: updated.id.clone(),
            position,
            views: updated.views,
            page_version,
            index_write_attempts: attempts,
        }
    }
}
