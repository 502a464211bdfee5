//! Denormalized article index model.
//!
//! # Responsibility
//! - Define the paginated listing document and its metadata entries.
//! - Provide (page, slot) addressing helpers.
//!
//! # Invariants
//! - Every indexed article appears in exactly one slot across all pages.
//! - `IndexPage::version` is owned by the index store and changes on every
//!   persisted write of that page.

use crate::model::article::ArticleId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Listing projection of one article. Excludes the article body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMetadata {
    pub id: ArticleId,
    pub first_published: i64,
    pub last_modified: i64,
    pub title: String,
    pub subtitle: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub edition: u64,
    pub views: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
}

/// One page of index slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPage {
    /// Optimistic-concurrency token; `0` for a page never persisted.
    #[serde(default)]
    pub version: u64,
    pub slots: Vec<ArticleMetadata>,
}

impl IndexPage {
    pub fn new(slots: Vec<ArticleMetadata>) -> Self {
        Self { version: 0, slots }
    }
}

/// Singleton listing document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleIndex {
    pub id: String,
    pub last_modified: i64,
    /// Total number of indexed articles.
    pub count: u64,
    pub body: Vec<IndexPage>,
}

impl ArticleIndex {
    /// Creates an empty index document.
    pub fn empty(id: impl Into<String>, last_modified: i64) -> Self {
        Self {
            id: id.into(),
            last_modified,
            count: 0,
            body: Vec::new(),
        }
    }

    /// Returns the entry at `position`, if the coordinate exists.
    pub fn entry(&self, position: IndexPosition) -> Option<&ArticleMetadata> {
        self.body
            .get(position.page)
            .and_then(|page| page.slots.get(position.slot))
    }

    /// Overwrites the entry at `position`.
    ///
    /// Returns `false` without mutating when the coordinate does not exist.
    pub fn replace_entry(&mut self, position: IndexPosition, metadata: ArticleMetadata) -> bool {
        match self
            .body
            .get_mut(position.page)
            .and_then(|page| page.slots.get_mut(position.slot))
        {
            Some(slot) => {
                *slot = metadata;
                true
            }
            None => false,
        }
    }

    /// Counts entries actually present in all pages.
    pub fn slot_count(&self) -> usize {
        self.body.iter().map(|page| page.slots.len()).sum()
    }
}

/// (page, slot) coordinate of one entry inside `ArticleIndex::body`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexPosition {
    pub page: usize,
    pub slot: usize,
}

impl Display for IndexPosition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::{ArticleIndex, IndexPage, IndexPosition};
    use crate::index::projector::project_metadata;
    use crate::model::article::{Article, ArticleId};

    fn article(raw: &str, views: u64) -> Article {
        let mut article = Article::new(ArticleId::parse(raw).unwrap(), 1, "t", "", "essay");
        article.views = views;
        article
    }

    #[test]
    fn replace_entry_reports_missing_coordinates() {
        let mut index = ArticleIndex::empty("i", 0);
        index.body = vec![IndexPage::new(vec![project_metadata(&article("a", 0))])];

        let here = IndexPosition { page: 0, slot: 0 };
        assert!(index.replace_entry(here, project_metadata(&article("a", 3))));
        assert_eq!(index.entry(here).map(|entry| entry.views), Some(3));

        let before = index.clone();
        let past_slot = IndexPosition { page: 0, slot: 1 };
        let past_page = IndexPosition { page: 4, slot: 0 };
        assert!(!index.replace_entry(past_slot, project_metadata(&article("b", 0))));
        assert!(!index.replace_entry(past_page, project_metadata(&article("b", 0))));
        assert_eq!(index, before);
    }
}
