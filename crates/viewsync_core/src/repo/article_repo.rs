//! Article store contract and SQLite implementation.
//!
//! # Responsibility
//! - Provide get/put access to authoritative article records.
//! - Provide the store-side atomic view increment.
//!
//! # Invariants
//! - Write paths must call `Article::validate()` before SQL mutations.
//! - `increment_views` never rewrites content fields, so concurrent content
//!   edits are not clobbered.
//! - Read paths reject invalid persisted state instead of masking it.

use crate::db::DbError;
use crate::model::article::{Article, ArticleId, ArticleValidationError, ContentBlock};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const ARTICLE_SELECT_SQL: &str = "SELECT
    id,
    first_published,
    last_modified,
    title,
    subtitle,
    type,
    edition,
    views,
    body,
    tags,
    series
FROM articles";

pub type RepoResult<T> = Result<T, RepoError>;

/// Store-client error shared by the article and index stores.
#[derive(Debug)]
pub enum RepoError {
    Validation(ArticleValidationError),
    Db(DbError),
    /// Keyed document does not exist.
    NotFound(String),
    InvalidData(String),
    /// Conditional write lost against a concurrent writer.
    Conflict {
        key: String,
        expected_version: u64,
    },
    /// Store did not confirm the call (timeout, lock contention, outage).
    Unavailable(String),
}

impl RepoError {
    /// Stable machine-readable code used in logs and batch reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Db(_) => "db",
            Self::NotFound(_) => "not_found",
            Self::InvalidData(_) => "invalid_data",
            Self::Conflict { .. } => "conflict",
            Self::Unavailable(_) => "unavailable",
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(key) => write!(f, "document not found: {key}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::Conflict {
                key,
                expected_version,
            } => write!(
                f,
                "conditional write rejected for {key}: expected version {expected_version}"
            ),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ArticleValidationError> for RepoError {
    fn from(value: ArticleValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        if value.is_busy() {
            return Self::Unavailable(value.to_string());
        }
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::from(DbError::Sqlite(value))
    }
}

/// Typed access to the authoritative article records.
pub trait ArticleStore {
    /// Reads one article by id. `Ok(None)` is the not-found signal.
    fn get_article(&self, id: &ArticleId) -> RepoResult<Option<Article>>;
    /// Validated upsert; returns the record as stored.
    ///
    /// On an existing id, `first_published` is kept, and `views` and
    /// `last_modified` never move backwards.
    fn put_article(&self, article: &Article) -> RepoResult<Article>;
    /// Atomically adds one view and returns the post-increment record.
    ///
    /// `last_modified` becomes `max(last_modified, modified_at)`.
    fn increment_views(&self, id: &ArticleId, modified_at: i64) -> RepoResult<Article>;
}

impl<S: ArticleStore + ?Sized> ArticleStore for &S {
    fn get_article(&self, id: &ArticleId) -> RepoResult<Option<Article>> {
        (**self).get_article(id)
    }

    fn put_article(&self, article: &Article) -> RepoResult<Article> {
        (**self).put_article(article)
    }

    fn increment_views(&self, id: &ArticleId, modified_at: i64) -> RepoResult<Article> {
        (**self).increment_views(id, modified_at)
    }
}

/// SQLite-backed article store.
pub struct SqliteArticleStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteArticleStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ArticleStore for SqliteArticleStore<'_> {
    fn get_article(&self, id: &ArticleId) -> RepoResult<Option<Article>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ARTICLE_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id.as_str()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_article_row(row)?));
        }
        Ok(None)
    }

    fn put_article(&self, article: &Article) -> RepoResult<Article> {
        article.validate()?;

        let body = encode_json(&article.body, "body")?;
        let tags = article
            .tags
            .as_ref()
            .map(|tags| encode_json(tags, "tags"))
            .transpose()?;

        let stored = self.conn.query_row(
            "INSERT INTO articles (
                id,
                first_published,
                last_modified,
                title,
                subtitle,
                type,
                edition,
                views,
                body,
                tags,
                series
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (id) DO UPDATE SET
                last_modified = MAX(articles.last_modified, excluded.last_modified),
                title = excluded.title,
                subtitle = excluded.subtitle,
                type = excluded.type,
                edition = excluded.edition,
                views = MAX(articles.views, excluded.views),
                body = excluded.body,
                tags = excluded.tags,
                series = excluded.series
            RETURNING
                id,
                first_published,
                last_modified,
                title,
                subtitle,
                type,
                edition,
                views,
                body,
                tags,
                series;",
            params![
                article.id.as_str(),
                article.first_published,
                article.last_modified,
                article.title.as_str(),
                article.subtitle.as_str(),
                article.kind.as_str(),
                to_db_counter(article.edition, "edition")?,
                to_db_counter(article.views, "views")?,
                body,
                tags,
                article.series.as_deref(),
            ],
            |row| Ok(parse_article_row(row)),
        )?;

        stored
    }

    fn increment_views(&self, id: &ArticleId, modified_at: i64) -> RepoResult<Article> {
        let updated = self
            .conn
            .query_row(
                "UPDATE articles
                 SET
                    views = views + 1,
                    last_modified = MAX(last_modified, ?2)
                 WHERE id = ?1
                 RETURNING
                    id,
                    first_published,
                    last_modified,
                    title,
                    subtitle,
                    type,
                    edition,
                    views,
                    body,
                    tags,
                    series;",
                params![id.as_str(), modified_at],
                |row| Ok(parse_article_row(row)),
            )
            .optional()?;

        match updated {
            Some(article) => article,
            None => Err(RepoError::NotFound(id.to_string())),
        }
    }
}

fn parse_article_row(row: &Row<'_>) -> RepoResult<Article> {
    let id_text: String = row.get("id")?;
    let id = ArticleId::parse(&id_text).map_err(|_| {
        RepoError::InvalidData(format!("invalid article id `{id_text}` in articles.id"))
    })?;

    let body_text: String = row.get("body")?;
    let body: Vec<ContentBlock> = decode_json(&body_text, "articles.body")?;
    let tags: Option<BTreeSet<String>> = match row.get::<_, Option<String>>("tags")? {
        Some(value) => Some(decode_json(&value, "articles.tags")?),
        None => None,
    };

    let article = Article {
        id,
        first_published: row.get("first_published")?,
        last_modified: row.get("last_modified")?,
        title: row.get("title")?,
        subtitle: row.get("subtitle")?,
        kind: row.get("type")?,
        edition: from_db_counter(row.get("edition")?, "articles.edition")?,
        views: from_db_counter(row.get("views")?, "articles.views")?,
        body,
        tags,
        series: row.get("series")?,
    };
    article.validate()?;
    Ok(article)
}

pub(crate) fn encode_json<T: serde::Serialize + ?Sized>(
    value: &T,
    field: &str,
) -> RepoResult<String> {
    serde_json::to_string(value)
        .map_err(|err| RepoError::InvalidData(format!("cannot encode {field}: {err}")))
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    text: &str,
    column: &str,
) -> RepoResult<T> {
    serde_json::from_str(text)
        .map_err(|err| RepoError::InvalidData(format!("invalid json in {column}: {err}")))
}

pub(crate) fn to_db_counter(value: u64, field: &str) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("{field} value {value} exceeds i64 range")))
}

pub(crate) fn from_db_counter(value: i64, column: &str) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative value {value} in {column}")))
}
