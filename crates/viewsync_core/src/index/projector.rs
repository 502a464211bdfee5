//! Metadata projector.

use crate::model::article::Article;
use crate::model::index::ArticleMetadata;

/// Derives the index entry of `article`.
///
/// Copies every listing field verbatim; `body` is never projected.
pub fn project_metadata(article: &Article) -> ArticleMetadata {
    ArticleMetadata {
        id: article.id.clone(),
        first_published: article.first_published,
        last_modified: article.last_modified,
        title: article.title.clone(),
        subtitle: article.subtitle.clone(),
        kind: article.kind.clone(),
        edition: article.edition,
        views: article.views,
        tags: article.tags.clone(),
        series: article.series.clone(),
    }
}

impl From<&Article> for ArticleMetadata {
    fn from(value: &Article) -> Self {
        project_metadata(value)
    }
}
