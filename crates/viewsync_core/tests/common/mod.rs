#![allow(dead_code)]

use rusqlite::Connection;
use std::cell::Cell;
use viewsync_core::{
    Article, ArticleId, ArticleIndex, ArticleStore, FixedClock, IndexPage, IndexStore,
    PublishService, Reconciler, RepoError, RepoResult, SqliteArticleStore, SqliteIndexStore,
    SyncConfig,
};

pub const PUBLISHED_AT: i64 = 100;
pub const NOW: i64 = 5_000;

pub fn id(raw: &str) -> ArticleId {
    ArticleId::parse(raw).unwrap()
}

pub fn article(raw_id: &str, views: u64) -> Article {
    let mut article = Article::new(id(raw_id), PUBLISHED_AT, "T", "sub", "essay");
    article.views = views;
    article
}

/// Creates the index and publishes `articles` in order.
pub fn seed(conn: &Connection, articles: &[Article]) {
    seed_with_page_size(conn, articles, SyncConfig::default().page_size);
}

pub fn seed_with_page_size(conn: &Connection, articles: &[Article], page_size: usize) {
    let config = SyncConfig {
        page_size,
        ..SyncConfig::default()
    };
    let service = PublishService::new(
        SqliteArticleStore::new(conn),
        SqliteIndexStore::new(conn),
        FixedClock(PUBLISHED_AT),
        config,
    );
    service.init_index().unwrap();
    for article in articles {
        service.publish(article).unwrap();
    }
}

/// Stores an article without indexing it.
pub fn store_article(conn: &Connection, article: &Article) {
    SqliteArticleStore::new(conn).put_article(article).unwrap();
}

pub fn reconciler(
    conn: &Connection,
) -> Reconciler<SqliteArticleStore<'_>, SqliteIndexStore<'_>, FixedClock> {
    Reconciler::new(
        SqliteArticleStore::new(conn),
        SqliteIndexStore::new(conn),
        FixedClock(NOW),
        SyncConfig::default(),
    )
}

pub fn read_article(conn: &Connection, raw_id: &str) -> Article {
    SqliteArticleStore::new(conn)
        .get_article(&id(raw_id))
        .unwrap()
        .unwrap()
}

pub fn read_index(conn: &Connection) -> ArticleIndex {
    SqliteIndexStore::new(conn)
        .get_index(&SyncConfig::default().index_id)
        .unwrap()
        .unwrap()
}

/// Article store double with switchable failures.
pub struct FlakyArticles<'conn> {
    pub inner: SqliteArticleStore<'conn>,
    pub fail_get: bool,
    pub fail_increment: bool,
    pub increments: Cell<u32>,
}

impl<'conn> FlakyArticles<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            inner: SqliteArticleStore::new(conn),
            fail_get: false,
            fail_increment: false,
            increments: Cell::new(0),
        }
    }
}

impl ArticleStore for FlakyArticles<'_> {
    fn get_article(&self, id: &ArticleId) -> RepoResult<Option<Article>> {
        if self.fail_get {
            return Err(RepoError::Unavailable("read timed out".to_string()));
        }
        self.inner.get_article(id)
    }

    fn put_article(&self, article: &Article) -> RepoResult<Article> {
        self.inner.put_article(article)
    }

    fn increment_views(&self, id: &ArticleId, modified_at: i64) -> RepoResult<Article> {
        self.increments.set(self.increments.get() + 1);
        if self.fail_increment {
            return Err(RepoError::Unavailable("update timed out".to_string()));
        }
        self.inner.increment_views(id, modified_at)
    }
}

/// Index store double with switchable failures and injected concurrent writers.
pub struct FlakyIndex<'conn> {
    pub conn: &'conn Connection,
    pub inner: SqliteIndexStore<'conn>,
    pub fail_get: bool,
    pub fail_put_page: bool,
    /// Number of upcoming `put_page` calls preceded by a concurrent page bump.
    pub concurrent_bumps: Cell<u32>,
    pub put_page_calls: Cell<u32>,
}

impl<'conn> FlakyIndex<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self {
            conn,
            inner: SqliteIndexStore::new(conn),
            fail_get: false,
            fail_put_page: false,
            concurrent_bumps: Cell::new(0),
            put_page_calls: Cell::new(0),
        }
    }
}

impl IndexStore for FlakyIndex<'_> {
    fn get_index(&self, index_id: &str) -> RepoResult<Option<ArticleIndex>> {
        if self.fail_get {
            return Err(RepoError::Unavailable("index read timed out".to_string()));
        }
        self.inner.get_index(index_id)
    }

    fn put_index(&self, index: &ArticleIndex) -> RepoResult<()> {
        self.inner.put_index(index)
    }

    fn put_page(
        &self,
        index_id: &str,
        page_no: usize,
        page: &IndexPage,
        last_modified: i64,
    ) -> RepoResult<u64> {
        self.put_page_calls.set(self.put_page_calls.get() + 1);
        if self.fail_put_page {
            return Err(RepoError::Unavailable("index write timed out".to_string()));
        }
        if self.concurrent_bumps.get() > 0 {
            self.concurrent_bumps.set(self.concurrent_bumps.get() - 1);
            self.conn
                .execute(
                    "UPDATE article_index_pages SET version = version + 1
                     WHERE index_id = ?1 AND page_no = ?2;",
                    rusqlite::params![index_id, page_no as i64],
                )
                .unwrap();
        }
        self.inner.put_page(index_id, page_no, page, last_modified)
    }
}
