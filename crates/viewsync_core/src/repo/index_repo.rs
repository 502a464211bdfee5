//! Article index store contract and SQLite implementation.
//!
//! # Responsibility
//! - Read the paginated index as one logical document.
//! - Persist it either wholesale (`put_index`) or one page at a time with an
//!   optimistic version check (`put_page`).
//!
//! # Invariants
//! - Every persisted page write bumps that page's `version`.
//! - `put_page` never lowers the header `last_modified`.
//! - Full-document replacement runs in a single transaction.

use crate::model::index::{ArticleIndex, ArticleMetadata, IndexPage};
use crate::repo::article_repo::{
    decode_json, encode_json, from_db_counter, to_db_counter, RepoError, RepoResult,
};
use rusqlite::{params, Connection, OptionalExtension};

/// Typed access to the paginated article index.
pub trait IndexStore {
    /// Reads the whole index. `Ok(None)` is the not-found signal.
    fn get_index(&self, index_id: &str) -> RepoResult<Option<ArticleIndex>>;
    /// Replaces the whole index document, pages included.
    fn put_index(&self, index: &ArticleIndex) -> RepoResult<()>;
    /// Conditionally rewrites one page.
    ///
    /// Succeeds only when the stored version equals `page.version`, and
    /// returns the new version. Fails with `RepoError::Conflict` otherwise.
    fn put_page(
        &self,
        index_id: &str,
        page_no: usize,
        page: &IndexPage,
        last_modified: i64,
    ) -> RepoResult<u64>;
}

impl<S: IndexStore + ?Sized> IndexStore for &S {
    fn get_index(&self, index_id: &str) -> RepoResult<Option<ArticleIndex>> {
        (**self).get_index(index_id)
    }

    fn put_index(&self, index: &ArticleIndex) -> RepoResult<()> {
        (**self).put_index(index)
    }

    fn put_page(
        &self,
        index_id: &str,
        page_no: usize,
        page: &IndexPage,
        last_modified: i64,
    ) -> RepoResult<u64> {
        (**self).put_page(index_id, page_no, page, last_modified)
    }
}

/// SQLite-backed index store.
pub struct SqliteIndexStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteIndexStore<'conn> {
    /// Constructs a store from a migrated connection.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl IndexStore for SqliteIndexStore<'_> {
    fn get_index(&self, index_id: &str) -> RepoResult<Option<ArticleIndex>> {
        let header = self
            .conn
            .query_row(
                "SELECT last_modified, count FROM article_index WHERE id = ?1;",
                [index_id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let Some((last_modified, count)) = header else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT page_no, slots, version
             FROM article_index_pages
             WHERE index_id = ?1
             ORDER BY page_no ASC;",
        )?;
        let mut rows = stmt.query([index_id])?;
        let mut body = Vec::new();

        while let Some(row) = rows.next()? {
            let page_no: i64 = row.get(0)?;
            if page_no != body.len() as i64 {
                return Err(RepoError::InvalidData(format!(
                    "index `{index_id}` has a gap before page {page_no}"
                )));
            }
            let slots_text: String = row.get(1)?;
            let slots: Vec<ArticleMetadata> =
                decode_json(&slots_text, "article_index_pages.slots")?;
            body.push(IndexPage {
                version: from_db_counter(row.get(2)?, "article_index_pages.version")?,
                slots,
            });
        }

        Ok(Some(ArticleIndex {
            id: index_id.to_string(),
            last_modified,
            count: from_db_counter(count, "article_index.count")?,
            body,
        }))
    }

    fn put_index(&self, index: &ArticleIndex) -> RepoResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        tx.execute(
            "INSERT INTO article_index (id, last_modified, count)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET
                last_modified = excluded.last_modified,
                count = excluded.count;",
            params![
                index.id.as_str(),
                index.last_modified,
                to_db_counter(index.count, "count")?
            ],
        )?;

        tx.execute(
            "DELETE FROM article_index_pages WHERE index_id = ?1 AND page_no >= ?2;",
            params![index.id.as_str(), page_no_to_db(index.body.len())?],
        )?;

        for (page_no, page) in index.body.iter().enumerate() {
            tx.execute(
                "INSERT INTO article_index_pages (index_id, page_no, slots, version)
                 VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT (index_id, page_no) DO UPDATE SET
                    slots = excluded.slots,
                    version = article_index_pages.version + 1;",
                params![
                    index.id.as_str(),
                    page_no_to_db(page_no)?,
                    encode_json(&page.slots, "slots")?
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn put_page(
        &self,
        index_id: &str,
        page_no: usize,
        page: &IndexPage,
        last_modified: i64,
    ) -> RepoResult<u64> {
        let tx = self.conn.unchecked_transaction()?;

        let new_version = tx
            .query_row(
                "UPDATE article_index_pages
                 SET
                    slots = ?4,
                    version = version + 1
                 WHERE index_id = ?1 AND page_no = ?2 AND version = ?3
                 RETURNING version;",
                params![
                    index_id,
                    page_no_to_db(page_no)?,
                    to_db_counter(page.version, "version")?,
                    encode_json(&page.slots, "slots")?
                ],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        let Some(new_version) = new_version else {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM article_index_pages WHERE index_id = ?1 AND page_no = ?2;",
                    params![index_id, page_no_to_db(page_no)?],
                    |_| Ok(()),
                )
                .optional()?
                .is_some();
            let key = format!("{index_id}/page/{page_no}");
            return Err(if exists {
                RepoError::Conflict {
                    key,
                    expected_version: page.version,
                }
            } else {
                RepoError::NotFound(key)
            });
        };

        tx.execute(
            "UPDATE article_index
             SET last_modified = MAX(last_modified, ?2)
             WHERE id = ?1;",
            params![index_id, last_modified],
        )?;

        tx.commit()?;
        from_db_counter(new_version, "article_index_pages.version")
    }
}

fn page_no_to_db(page_no: usize) -> RepoResult<i64> {
    i64::try_from(page_no)
        .map_err(|_| RepoError::InvalidData(format!("page number {page_no} exceeds i64 range")))
}
