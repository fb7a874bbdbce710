//! SQLite-backed [`ArticleStore`] implementation.
//!
//! Every write is one `INSERT … ON CONFLICT(url) DO UPDATE … RETURNING id`
//! statement, so two concurrent upserts of the same URL can never produce
//! two rows. Whether the statement inserted or updated is read back from
//! the returned id: the freshly generated id comes back only on insert.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use blog_harvest_core::embedding::{blob_to_vec, vec_to_blob};
use blog_harvest_core::models::{CanonicalArticle, StoredArticle, UpsertOutcome};
use blog_harvest_core::store::ArticleStore;

use crate::config::Config;
use crate::{db, migrate};

const SELECT_COLUMNS: &str = "id, url, title, published_date, source, tags_json, category, \
     embedding, summary, content, created_at, updated_at";

/// SQLite implementation of the [`ArticleStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the configured database and make sure the schema exists.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Every stored article, oldest first.
    pub async fn all_articles(&self) -> Result<Vec<StoredArticle>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM articles ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_article).collect()
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn row_to_article(row: &SqliteRow) -> Result<StoredArticle> {
    let tags_json: String = row.get("tags_json");
    let tags: Vec<String> =
        serde_json::from_str(&tags_json).context("Corrupt tags_json column")?;
    let published: Option<i64> = row.get("published_date");
    let embedding: Option<Vec<u8>> = row.get("embedding");

    Ok(StoredArticle {
        id: row.get("id"),
        article: CanonicalArticle {
            url: row.get("url"),
            title: row.get("title"),
            published_date: published.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            source: row.get("source"),
            tags,
            category: row.get("category"),
            embedding: embedding.map(|blob| blob_to_vec(&blob)),
            summary: row.get("summary"),
            content: row.get("content"),
        },
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn find_by_url(&self, url: &str) -> Result<Option<StoredArticle>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM articles WHERE url = ?"
        ))
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_article).transpose()
    }

    async fn upsert(&self, article: &CanonicalArticle) -> Result<UpsertOutcome> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();
        let tags_json = serde_json::to_string(&article.tags)?;
        let blob = article.embedding.as_deref().map(vec_to_blob);
        let dims = article.embedding.as_ref().map(|v| v.len() as i64);

        let returned: String = sqlx::query_scalar(
            r#"
            INSERT INTO articles (id, url, title, published_date, source, tags_json,
                                  category, embedding, embedding_dims, summary, content,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(url) DO UPDATE SET
                title = excluded.title,
                published_date = COALESCE(excluded.published_date, articles.published_date),
                source = excluded.source,
                tags_json = excluded.tags_json,
                category = excluded.category,
                embedding = COALESCE(excluded.embedding, articles.embedding),
                embedding_dims = COALESCE(excluded.embedding_dims, articles.embedding_dims),
                summary = COALESCE(excluded.summary, articles.summary),
                content = COALESCE(excluded.content, articles.content),
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(&id)
        .bind(&article.url)
        .bind(&article.title)
        .bind(article.published_date.map(|d| d.timestamp()))
        .bind(&article.source)
        .bind(&tags_json)
        .bind(&article.category)
        .bind(blob)
        .bind(dims)
        .bind(&article.summary)
        .bind(&article.content)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("Failed to upsert article {}", article.url))?;

        if returned == id {
            Ok(UpsertOutcome::Inserted)
        } else {
            Ok(UpsertOutcome::Updated)
        }
    }

    async fn articles_with_embeddings(&self) -> Result<Vec<StoredArticle>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM articles WHERE embedding IS NOT NULL \
             ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_article).collect()
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
