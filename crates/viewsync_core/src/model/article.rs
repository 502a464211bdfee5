//! Article domain model.
//!
//! # Responsibility
//! - Define the authoritative article record and its opaque identifier.
//! - Validate record invariants before persistence.
//!
//! # Invariants
//! - `ArticleId` is independent of `first_published`; two articles published
//!   in the same millisecond still have distinct ids.
//! - `views` never decreases. View increments do not touch `edition`.
//! - `last_modified` is never earlier than `first_published`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

const ARTICLE_ID_MAX_CHARS: usize = 128;

static ARTICLE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:\-]+$").expect("valid article id regex"));

/// One ordered content block of an article body.
pub type ContentBlock = BTreeMap<String, String>;

/// Opaque, stable identifier of one article.
///
/// Kept separate from `Article::first_published` so creation time is only a
/// timestamp attribute, never a key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArticleId(String);

impl ArticleId {
    /// Parses a raw identifier, trimming surrounding whitespace.
    ///
    /// # Errors
    /// - `ArticleValidationError::InvalidId` when the value is empty, longer
    ///   than 128 chars, or contains characters outside `[A-Za-z0-9._:-]`.
    pub fn parse(raw: &str) -> Result<Self, ArticleValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty()
            || trimmed.chars().count() > ARTICLE_ID_MAX_CHARS
            || !ARTICLE_ID_RE.is_match(trimmed)
        {
            return Err(ArticleValidationError::InvalidId(raw.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for ArticleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ArticleId {
    type Error = ArticleValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value.as_str())
    }
}

impl From<ArticleId> for String {
    fn from(value: ArticleId) -> Self {
        value.0
    }
}

/// Model validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleValidationError {
    InvalidId(String),
    EmptyTitle,
    EmptyKind,
    InvalidEdition(u64),
    LastModifiedBeforeFirstPublished {
        first_published: i64,
        last_modified: i64,
    },
}

impl Display for ArticleValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidId(value) => write!(f, "invalid article id: `{value}`"),
            Self::EmptyTitle => write!(f, "article title cannot be empty"),
            Self::EmptyKind => write!(f, "article type cannot be empty"),
            Self::InvalidEdition(value) => {
                write!(f, "article edition must be >= 1, got {value}")
            }
            Self::LastModifiedBeforeFirstPublished {
                first_published,
                last_modified,
            } => write!(
                f,
                "last_modified {last_modified} is earlier than first_published {first_published}"
            ),
        }
    }
}

impl Error for ArticleValidationError {}

/// Authoritative record of one published article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: ArticleId,
    /// Unix epoch milliseconds of the first publish. Immutable.
    pub first_published: i64,
    /// Unix epoch milliseconds of the latest write of any kind.
    pub last_modified: i64,
    pub title: String,
    pub subtitle: String,
    /// Serialized as `type` to match the external document shape.
    #[serde(rename = "type")]
    pub kind: String,
    /// Content revision counter, starts at 1.
    pub edition: u64,
    pub views: u64,
    #[serde(default)]
    pub body: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
}

impl Article {
    /// Creates a first-edition article with zero views.
    pub fn new(
        id: ArticleId,
        first_published: i64,
        title: impl Into<String>,
        subtitle: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            id,
            first_published,
            last_modified: first_published,
            title: title.into(),
            subtitle: subtitle.into(),
            kind: kind.into(),
            edition: 1,
            views: 0,
            body: Vec::new(),
            tags: None,
            series: None,
        }
    }

    /// Checks record invariants.
    pub fn validate(&self) -> Result<(), ArticleValidationError> {
        if self.title.trim().is_empty() {
            return Err(ArticleValidationError::EmptyTitle);
        }
        if self.kind.trim().is_empty() {
            return Err(ArticleValidationError::EmptyKind);
        }
        if self.edition == 0 {
            return Err(ArticleValidationError::InvalidEdition(self.edition));
        }
        if self.last_modified < self.first_published {
            return Err(ArticleValidationError::LastModifiedBeforeFirstPublished {
                first_published: self.first_published,
                last_modified: self.last_modified,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Article, ArticleId, ArticleValidationError};

    fn sample() -> Article {
        Article::new(ArticleId::parse("100").unwrap(), 100, "T", "S", "essay")
    }

    #[test]
    fn parse_trims_and_rejects_invalid_ids() {
        assert_eq!(ArticleId::parse(" 100 ").unwrap().as_str(), "100");
        assert!(ArticleId::parse("").is_err());
        assert!(ArticleId::parse("   ").is_err());
        assert!(ArticleId::parse("a b").is_err());
        assert!(ArticleId::parse(&"x".repeat(129)).is_err());
    }

    #[test]
    fn new_article_is_valid_first_edition() {
        let article = sample();
        assert_eq!(article.edition, 1);
        assert_eq!(article.views, 0);
        assert_eq!(article.last_modified, article.first_published);
        article.validate().unwrap();
    }

    #[test]
    fn validate_rejects_time_travel() {
        let mut article = sample();
        article.last_modified = 99;
        assert!(matches!(
            article.validate(),
            Err(ArticleValidationError::LastModifiedBeforeFirstPublished { .. })
        ));
    }

    #[test]
    fn json_shape_uses_external_field_names() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["firstPublished"], 100);
        assert_eq!(value["type"], "essay");
        assert!(value.get("tags").is_none());

        let bad = serde_json::json!({
            "id": "", "firstPublished": 1, "lastModified": 1, "title": "t",
            "subtitle": "", "type": "x", "edition": 1, "views": 0
        });
        assert!(serde_json::from_value::<Article>(bad).is_err());
    }
}
