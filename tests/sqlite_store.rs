//! SQLite content store tests against a throwaway database.

use std::sync::Arc;
use tempfile::TempDir;

use blog_harvest::config::Config;
use blog_harvest::sqlite_store::SqliteStore;
use blog_harvest_core::models::{CanonicalArticle, UpsertOutcome};
use blog_harvest_core::store::ArticleStore;

async fn open_store() -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("data/harvest.sqlite"));
    let store = SqliteStore::connect(&config).await.unwrap();
    (tmp, store)
}

fn article(url: &str, title: &str) -> CanonicalArticle {
    CanonicalArticle {
        url: url.to_string(),
        title: title.to_string(),
        published_date: chrono::DateTime::from_timestamp(1_714_521_600, 0),
        source: "Slack Engineering Blog".to_string(),
        tags: vec!["edge".to_string(), "caching".to_string()],
        category: "Infrastructure".to_string(),
        embedding: Some(vec![0.25, -0.5, 1.0]),
        summary: Some("How we cache at the edge".to_string()),
        content: None,
    }
}

#[tokio::test]
async fn test_upsert_insert_then_update_keeps_identity() {
    let (_tmp, store) = open_store().await;
    let url = "https://slack.engineering/edge-cache";

    let first = article(url, "Edge caching");
    assert_eq!(store.upsert(&first).await.unwrap(), UpsertOutcome::Inserted);
    let stored = store.find_by_url(url).await.unwrap().unwrap();

    let mut second = article(url, "Edge caching, revisited");
    second.summary = None;
    second.published_date = None;
    second.embedding = Some(vec![1.0, 0.0, 0.0]);
    assert_eq!(store.upsert(&second).await.unwrap(), UpsertOutcome::Updated);

    let updated = store.find_by_url(url).await.unwrap().unwrap();
    assert_eq!(updated.id, stored.id);
    assert_eq!(updated.created_at, stored.created_at);
    assert_eq!(updated.article.title, "Edge caching, revisited");
    assert_eq!(updated.article.embedding, Some(vec![1.0, 0.0, 0.0]));
    // Null incoming values keep what was stored.
    assert_eq!(
        updated.article.summary.as_deref(),
        Some("How we cache at the edge")
    );
    assert_eq!(updated.article.published_date, first.published_date);
    assert_eq!(updated.article.tags, vec!["edge", "caching"]);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_concurrent_upserts_of_one_url_make_one_row() {
    let (_tmp, store) = open_store().await;
    let store = Arc::new(store);
    let url = "https://slack.engineering/race";

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.upsert(&article(url, &format!("Attempt {i}"))).await
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() == UpsertOutcome::Inserted {
            inserted += 1;
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_articles_with_embeddings_excludes_unembedded() {
    let (_tmp, store) = open_store().await;

    store
        .upsert(&article("https://slack.engineering/a", "With vector"))
        .await
        .unwrap();
    let mut bare = article("https://slack.engineering/b", "Without vector");
    bare.embedding = None;
    store.upsert(&bare).await.unwrap();

    let embedded = store.articles_with_embeddings().await.unwrap();
    assert_eq!(embedded.len(), 1);
    assert_eq!(embedded[0].article.title, "With vector");
    assert_eq!(embedded[0].article.embedding, Some(vec![0.25, -0.5, 1.0]));
    assert_eq!(store.all_articles().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_schema_creation_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let config = Config::minimal(tmp.path().join("harvest.sqlite"));

    blog_harvest::migrate::run_migrations(&config).await.unwrap();
    blog_harvest::migrate::run_migrations(&config).await.unwrap();

    let store = SqliteStore::connect(&config).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 0);
    store.close().await;
}
