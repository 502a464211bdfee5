mod common;

use common::{
    article, id, read_article, read_index, reconciler, seed, store_article, FlakyArticles,
    FlakyIndex, NOW, PUBLISHED_AT,
};
use viewsync_core::db::open_db_in_memory;
use viewsync_core::{
    project_metadata, FixedClock, IndexPosition, IndexStore, ReconcileOutcome, Reconciler,
    SqliteArticleStore, SqliteIndexStore, SyncConfig, SyncError, SyncStage,
};

#[test]
fn single_view_updates_article_and_index_entry() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("100", 5)]);

    let outcome = reconciler(&conn).reconcile(&id("100")).unwrap();
    let ReconcileOutcome::Success(report) = outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert_eq!(report.position, IndexPosition { page: 0, slot: 0 });
    assert_eq!(report.views, 6);
    assert_eq!(report.index_write_attempts, 1);

    let stored = read_article(&conn, "100");
    assert_eq!(stored.views, 6);
    assert_eq!(stored.edition, 1);
    assert_eq!(stored.first_published, PUBLISHED_AT);
    assert_eq!(stored.last_modified, NOW);

    let index = read_index(&conn);
    let entry = index.entry(IndexPosition { page: 0, slot: 0 }).unwrap();
    assert_eq!(entry.views, 6);
    assert_eq!(*entry, project_metadata(&stored));
    assert_eq!(index.last_modified, NOW);
    assert_eq!(index.count, 1);
}

#[test]
fn redelivered_event_counts_twice() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("a", 0)]);
    let reconciler = reconciler(&conn);

    assert!(reconciler.reconcile(&id("a")).unwrap().is_success());
    assert!(reconciler.reconcile(&id("a")).unwrap().is_success());

    assert_eq!(read_article(&conn, "a").views, 2);
    assert_eq!(read_index(&conn).body[0].slots[0].views, 2);
}

#[test]
fn only_the_target_entry_changes() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("a", 1), article("b", 2), article("c", 3)]);
    let before = read_index(&conn);

    reconciler(&conn).reconcile(&id("b")).unwrap();

    let after = read_index(&conn);
    assert_eq!(after.body[0].slots[0], before.body[0].slots[0]);
    assert_eq!(after.body[0].slots[2], before.body[0].slots[2]);
    assert_eq!(after.body[0].slots[1].views, 3);
    assert_eq!(after.body[0].version, before.body[0].version + 1);
}

#[test]
fn missing_article_is_not_found_without_writes() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("100", 5)]);
    let before = read_index(&conn);

    let outcome = reconciler(&conn).reconcile(&id("999")).unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::NotFound(SyncError::ArticleNotFound {
            article_id: id("999"),
            stage: SyncStage::FetchArticle,
        })
    );
    assert!(outcome.should_acknowledge());
    assert_eq!(read_index(&conn), before);
}

#[test]
fn unindexed_article_is_not_found_and_views_stay() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("indexed", 1)]);
    store_article(&conn, &article("fresh", 4));

    let outcome = reconciler(&conn).reconcile(&id("fresh")).unwrap();
    let err = outcome.error().unwrap();
    assert_eq!(err.stage(), SyncStage::ResolvePosition);
    assert!(matches!(outcome, ReconcileOutcome::NotFound(_)));
    assert_eq!(read_article(&conn, "fresh").views, 4);
}

#[test]
fn failed_article_write_leaves_index_unchanged() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("100", 5)]);
    let before = read_index(&conn);

    let mut articles = FlakyArticles::new(&conn);
    articles.fail_increment = true;
    let index = FlakyIndex::new(&conn);
    let reconciler = Reconciler::new(&articles, &index, FixedClock(NOW), SyncConfig::default());

    let outcome = reconciler.reconcile(&id("100")).unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::StoreWriteFailed(SyncError::ArticleUploadFailed { .. })
    ));
    assert!(!outcome.should_acknowledge());
    assert_eq!(index.put_page_calls.get(), 0);
    assert_eq!(read_index(&conn), before);
    assert_eq!(read_article(&conn, "100").views, 5);
}

#[test]
fn failed_index_write_keeps_increment_and_reports_divergence() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("100", 5)]);

    let articles = FlakyArticles::new(&conn);
    let mut index = FlakyIndex::new(&conn);
    index.fail_put_page = true;
    let reconciler = Reconciler::new(&articles, &index, FixedClock(NOW), SyncConfig::default());

    let outcome = reconciler.reconcile(&id("100")).unwrap();
    let ReconcileOutcome::StoreWriteFailed(err) = &outcome else {
        panic!("unexpected outcome: {outcome:?}");
    };
    assert_eq!(err.code(), "article_index_upload_failed");
    assert!(err.is_retryable());
    assert_eq!(index.put_page_calls.get(), 1);

    assert_eq!(read_article(&conn, "100").views, 6);
    assert_eq!(read_index(&conn).body[0].slots[0].views, 5);
}

#[test]
fn article_read_failure_is_retryable_and_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("100", 5)]);

    let mut articles = FlakyArticles::new(&conn);
    articles.fail_get = true;
    let index = FlakyIndex::new(&conn);
    let reconciler = Reconciler::new(&articles, &index, FixedClock(NOW), SyncConfig::default());

    let outcome = reconciler.reconcile(&id("100")).unwrap();
    assert!(matches!(outcome, ReconcileOutcome::StoreReadFailed(_)));
    assert!(!outcome.should_acknowledge());
    assert_eq!(articles.increments.get(), 0);
}

#[test]
fn missing_index_is_batch_fatal() {
    let conn = open_db_in_memory().unwrap();
    store_article(&conn, &article("100", 5));

    let err = reconciler(&conn).reconcile(&id("100")).unwrap_err();
    assert_eq!(
        err,
        SyncError::ArticleIndexNotFound {
            index_id: SyncConfig::default().index_id,
        }
    );
    assert!(err.is_batch_fatal());
    assert_eq!(read_article(&conn, "100").views, 5);
}

#[test]
fn unreadable_index_is_batch_fatal() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("100", 5)]);

    let articles = FlakyArticles::new(&conn);
    let mut index = FlakyIndex::new(&conn);
    index.fail_get = true;
    let reconciler = Reconciler::new(&articles, &index, FixedClock(NOW), SyncConfig::default());

    let err = reconciler.reconcile(&id("100")).unwrap_err();
    assert_eq!(err.code(), "article_index_read_failed");
    assert_eq!(articles.increments.get(), 0);
}

#[test]
fn page_conflict_is_retried_without_a_second_increment() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("100", 5)]);

    let articles = FlakyArticles::new(&conn);
    let index = FlakyIndex::new(&conn);
    index.concurrent_bumps.set(1);
    let reconciler = Reconciler::new(&articles, &index, FixedClock(NOW), SyncConfig::default());

    let ReconcileOutcome::Success(report) = reconciler.reconcile(&id("100")).unwrap() else {
        panic!("conflict should be absorbed by a retry");
    };
    assert_eq!(report.index_write_attempts, 2);
    assert_eq!(articles.increments.get(), 1);
    assert_eq!(read_article(&conn, "100").views, 6);
    assert_eq!(read_index(&conn).body[0].slots[0].views, 6);
}

#[test]
fn exhausted_conflict_retries_fail_the_index_write() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("100", 5)]);

    let articles = FlakyArticles::new(&conn);
    let index = FlakyIndex::new(&conn);
    index.concurrent_bumps.set(10);
    let config = SyncConfig {
        index_write_attempts: 2,
        ..SyncConfig::default()
    };
    let reconciler = Reconciler::new(&articles, &index, FixedClock(NOW), config);

    let outcome = reconciler.reconcile(&id("100")).unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::StoreWriteFailed(SyncError::ArticleIndexUploadFailed { .. })
    ));
    assert_eq!(index.put_page_calls.get(), 2);
    assert_eq!(articles.increments.get(), 1);
}

#[test]
fn entry_on_a_later_page_is_rewritten_in_place() {
    let conn = open_db_in_memory().unwrap();
    common::seed_with_page_size(
        &conn,
        &[article("a", 0), article("b", 0), article("c", 7)],
        2,
    );

    let ReconcileOutcome::Success(report) = reconciler(&conn).reconcile(&id("c")).unwrap() else {
        panic!("expected success");
    };
    assert_eq!(report.position, IndexPosition { page: 1, slot: 0 });

    let index = read_index(&conn);
    assert_eq!(index.body.len(), 2);
    assert_eq!(index.body[1].slots[0].views, 8);
    assert_eq!(index.body[0].slots[0].views, 0);
}

#[test]
fn content_fields_come_from_the_post_increment_record() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("a", 0)]);

    // Content edit lands in the article store after indexing.
    let mut edited = read_article(&conn, "a");
    edited.title = "Revised".to_string();
    edited.edition = 2;
    edited.last_modified = 300;
    store_article(&conn, &edited);

    let reconciler = Reconciler::new(
        SqliteArticleStore::new(&conn),
        SqliteIndexStore::new(&conn),
        FixedClock(NOW),
        SyncConfig::default(),
    );
    reconciler.reconcile(&id("a")).unwrap();

    let entry = read_index(&conn).body[0].slots[0].clone();
    assert_eq!(entry.title, "Revised");
    assert_eq!(entry.edition, 2);
    assert_eq!(entry.views, 1);
}

#[test]
fn index_entry_ahead_of_record_is_overwritten_with_projection() {
    let conn = open_db_in_memory().unwrap();
    seed(&conn, &[article("a", 0)]);

    let mut drifted = read_index(&conn);
    drifted.body[0].slots[0].views = 10;
    SqliteIndexStore::new(&conn).put_index(&drifted).unwrap();

    let mut edited = read_article(&conn, "a");
    edited.title = "Revised".to_string();
    store_article(&conn, &edited);

    assert!(reconciler(&conn).reconcile(&id("a")).unwrap().is_success());

    let stored = read_article(&conn, "a");
    assert_eq!(stored.views, 1);
    let entry = read_index(&conn).body[0].slots[0].clone();
    assert_eq!(entry, project_metadata(&stored));
}
