//! Index position resolver.

use crate::model::article::ArticleId;
use crate::model::index::{ArticleIndex, IndexPosition};

/// Finds the (page, slot) coordinate of `article_id` inside `index`.
///
/// Scans pages in order, then slots within each page in order, and returns
/// the first match. No ordering of entries by id is assumed.
///
/// Returns `None` when no slot carries the id; that is the normal state of an
/// article which has been published but not yet indexed.
pub fn resolve_position(index: &ArticleIndex, article_id: &ArticleId) -> Option<IndexPosition> {
    index
        .body
        .iter()
        .enumerate()
        .find_map(|(page, entries)| {
            entries
                .slots
                .iter()
                .position(|entry| entry.id == *article_id)
                .map(|slot| IndexPosition { page, slot })
        })
}
