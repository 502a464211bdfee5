//! Index bootstrap and article publishing.
//!
//! # Responsibility
//! - Create the singleton index document.
//! - Store a published article and make sure it owns exactly one index slot.
//!
//! # Invariants
//! - New entries go to the last page while it has room, else to a new page.
//! - Republishing an indexed article rewrites its slot in place; `count` is
//!   unchanged.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::index::projector::project_metadata;
use crate::index::resolver::resolve_position;
use crate::model::article::{Article, ArticleValidationError};
use crate::model::index::{ArticleIndex, ArticleMetadata, IndexPage, IndexPosition};
use crate::repo::article_repo::{ArticleStore, RepoError};
use crate::repo::index_repo::IndexStore;
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum PublishError {
    Validation(ArticleValidationError),
    /// `init_index` has not been run for this index id.
    IndexNotFound(String),
    Repo(RepoError),
}

impl Display for PublishError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::IndexNotFound(index_id) => write!(f, "article index not found: {index_id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for PublishError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::IndexNotFound(_) => None,
        }
    }
}

impl From<ArticleValidationError> for PublishError {
    fn from(value: ArticleValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for PublishError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            other => Self::Repo(other),
        }
    }
}

/// Where a published article landed in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishReceipt {
    pub position: IndexPosition,
    /// `false` when an existing slot was rewritten.
    pub appended: bool,
}

/// Publishing facade over the two stores.
pub struct PublishService<A, I, C> {
    article_store: A,
    index_store: I,
    clock: C,
    config: SyncConfig,
}

impl<A: ArticleStore, I: IndexStore, C: Clock> PublishService<A, I, C> {
    pub fn new(article_store: A, index_store: I, clock: C, config: SyncConfig) -> Self {
        Self {
            article_store,
            index_store,
            clock,
            config,
        }
    }

    /// Returns the index document, creating an empty one when absent.
    pub fn init_index(&self) -> Result<ArticleIndex, PublishError> {
        if let Some(existing) = self.index_store.get_index(&self.config.index_id)? {
            return Ok(existing);
        }

        let index = ArticleIndex::empty(self.config.index_id.clone(), self.clock.now_ms());
        self.index_store.put_index(&index)?;
        info!(
            "event=index_init module=publish status=ok index_id={}",
            index.id
        );
        Ok(index)
    }

    /// Stores `article` and folds its metadata into the index.
    ///
    /// The article record is written first, matching the reconciler's
    /// article-before-index ordering.
    pub fn publish(&self, article: &Article) -> Result<PublishReceipt, PublishError> {
        article.validate()?;
        let stored = self.article_store.put_article(article)?;

        let mut index = self
            .index_store
            .get_index(&self.config.index_id)?
            .ok_or_else(|| PublishError::IndexNotFound(self.config.index_id.clone()))?;

        let metadata = project_metadata(&stored);
        let receipt = match resolve_position(&index, &stored.id) {
            Some(position) => {
                if !index.replace_entry(position, metadata) {
                    return Err(PublishError::Repo(RepoError::InvalidData(format!(
                        "article index position {position} is out of range"
                    ))));
                }
                PublishReceipt {
                    position,
                    appended: false,
                }
            }
            None => {
                let position = append_entry(&mut index, metadata, self.config.page_size);
                index.count += 1;
                PublishReceipt {
                    position,
                    appended: true,
                }
            }
        };
        index.last_modified = index.last_modified.max(stored.last_modified);
        self.index_store.put_index(&index)?;

        info!(
            "event=publish module=publish status=ok article_id={} page={} slot={} appended={}",
            article.id, receipt.position.page, receipt.position.slot, receipt.appended
        );
        Ok(receipt)
    }
}

fn append_entry(
    index: &mut ArticleIndex,
    metadata: ArticleMetadata,
    page_size: usize,
) -> IndexPosition {
    let has_room = index
        .body
        .last()
        .is_some_and(|page| page.slots.len() < page_size.max(1));
    if !has_room {
        index.body.push(IndexPage::default());
    }

    let page_no = index.body.len() - 1;
    let page = &mut index.body[page_no];
    page.slots.push(metadata);
    IndexPosition {
        page: page_no,
        slot: page.slots.len() - 1,
    }
}
