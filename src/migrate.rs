use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Articles, keyed by normalized URL
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS articles (
            id TEXT PRIMARY KEY,
            url TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            published_date INTEGER,
            source TEXT NOT NULL,
            tags_json TEXT NOT NULL DEFAULT '[]',
            category TEXT NOT NULL,
            embedding BLOB,
            embedding_dims INTEGER,
            summary TEXT,
            content TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_articles_category ON articles(category)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_articles_published ON articles(published_date DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
