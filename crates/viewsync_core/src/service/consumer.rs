//! Batch driver for delivered view events.
//!
//! # Responsibility
//! - Reconcile each event of a batch independently and in delivery order.
//! - Decide which events may be acknowledged and which must be redelivered.
//! - Build the structured operation result for the transport caller.
//!
//! # Invariants
//! - Success and terminal not-found events are acknowledged.
//! - Retryable failures are never acknowledged.
//! - A batch-fatal error stops the batch; the aborting event and every later
//!   event stay unacknowledged.

use crate::clock::Clock;
use crate::model::article::{ArticleId, ArticleValidationError};
use crate::model::event::ViewEvent;
use crate::repo::article_repo::ArticleStore;
use crate::repo::index_repo::IndexStore;
use crate::service::reconciler::{ReconcileOutcome, Reconciler, SyncError, SyncStage};
use log::{error, info};
use serde::Serialize;
use std::time::Instant;

/// Failure detail for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFailure {
    pub message_id: String,
    /// Parsed article id; absent when the body could not be parsed.
    pub article_id: Option<String>,
    pub stage: SyncStage,
    pub code: &'static str,
    /// `true` when the event was left for redelivery.
    pub retryable: bool,
    pub detail: String,
}

impl EventFailure {
    fn new(event: &ViewEvent, err: &SyncError) -> Self {
        Self {
            message_id: event.message_id.clone(),
            article_id: err.article_id().map(ToString::to_string),
            stage: err.stage(),
            code: err.code(),
            retryable: err.is_retryable(),
            detail: err.to_string(),
        }
    }
}

/// Operation result of one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    /// Message ids safe to remove from the transport.
    pub consumed: Vec<String>,
    /// Article ids whose view was applied to both stores.
    pub reconciled: Vec<ArticleId>,
    /// Per-event failures, terminal and retryable.
    pub failures: Vec<EventFailure>,
    /// Batch-fatal error, when the batch stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<EventFailure>,
    /// Message ids never reconciled because the batch stopped.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unprocessed: Vec<String>,
}

/// Transport-facing response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub status_code: u16,
    /// JSON-encoded `BatchReport`.
    pub body: String,
}

impl BatchReport {
    /// Message ids that must be redelivered.
    pub fn retry_message_ids(&self) -> Vec<&str> {
        self.failures
            .iter()
            .filter(|failure| failure.retryable)
            .map(|failure| failure.message_id.as_str())
            .chain(self.unprocessed.iter().map(String::as_str))
            .collect()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }

    /// Encodes the report into a status + JSON body envelope.
    ///
    /// - `200`: the batch ran to completion, per-event failures in the body.
    /// - `404`: the index document is missing.
    /// - `502`: the index store could not be read.
    pub fn to_response(&self) -> BatchResponse {
        let status_code = match &self.aborted {
            None => 200,
            Some(failure) if failure.code == "article_index_not_found" => 404,
            Some(_) => 502,
        };
        let body = serde_json::to_string(self).unwrap_or_else(|err| {
            serde_json::json!({ "error": format!("cannot encode batch report: {err}") })
                .to_string()
        });
        BatchResponse { status_code, body }
    }
}

/// Drives reconciliation over delivered event batches.
pub struct ViewEventConsumer<A, I, C> {
    reconciler: Reconciler<A, I, C>,
}

impl<A: ArticleStore, I: IndexStore, C: Clock> ViewEventConsumer<A, I, C> {
    pub fn new(reconciler: Reconciler<A, I, C>) -> Self {
        Self { reconciler }
    }

    pub fn reconciler(&self) -> &Reconciler<A, I, C> {
        &self.reconciler
    }

    /// Processes `events` sequentially and classifies each one.
    pub fn process_batch(&self, events: &[ViewEvent]) -> BatchReport {
        let started_at = Instant::now();
        let mut report = BatchReport::default();
        info!(
            "event=batch module=consumer status=start events={}",
            events.len()
        );

        for (position, event) in events.iter().enumerate() {
            let article_id = match parse_event(event) {
                Ok(article_id) => article_id,
                Err(err) => {
                    report.consumed.push(event.message_id.clone());
                    report.failures.push(EventFailure::new(event, &err));
                    continue;
                }
            };

            match self.reconciler.reconcile(&article_id) {
                Ok(ReconcileOutcome::Success(_)) => {
                    report.consumed.push(event.message_id.clone());
                    report.reconciled.push(article_id);
                }
                Ok(ReconcileOutcome::NotFound(err)) => {
                    report.consumed.push(event.message_id.clone());
                    report.failures.push(EventFailure::new(event, &err));
                }
                Ok(
                    ReconcileOutcome::StoreReadFailed(err)
                    | ReconcileOutcome::StoreWriteFailed(err),
                ) => {
                    report.failures.push(EventFailure::new(event, &err));
                }
                Err(err) => {
                    error!(
                        "event=batch module=consumer status=aborted message_id={} error_code={} remaining={} error={}",
                        event.message_id,
                        err.code(),
                        events.len() - position,
                        err
                    );
                    report.aborted = Some(EventFailure::new(event, &err));
                    report.unprocessed = events[position..]
                        .iter()
                        .map(|event| event.message_id.clone())
                        .collect();
                    break;
                }
            }
        }

        info!(
            "event=batch module=consumer status={} events={} consumed={} reconciled={} failures={} unprocessed={} duration_ms={}",
            if report.is_aborted() { "aborted" } else { "ok" },
            events.len(),
            report.consumed.len(),
            report.reconciled.len(),
            report.failures.len(),
            report.unprocessed.len(),
            started_at.elapsed().as_millis()
        );
        report
    }
}

fn parse_event(event: &ViewEvent) -> Result<ArticleId, SyncError> {
    ArticleId::parse(&event.body).map_err(|err: ArticleValidationError| SyncError::InvalidEvent {
        body: event.body.clone(),
        message: err.to_string(),
    })
}
