//! In-memory [`ArticleStore`] implementation for tests and dry runs.
//!
//! Rows live in a `Vec` (insertion order) with a URL index, both behind a
//! single `std::sync::RwLock`, so the lookup-then-write in
//! [`upsert`](ArticleStore::upsert) happens under one write guard.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::models::{CanonicalArticle, StoredArticle, UpsertOutcome};

use super::{apply_update, ArticleStore};

#[derive(Default)]
struct Rows {
    articles: Vec<StoredArticle>,
    by_url: HashMap<String, usize>,
}

/// In-memory store keyed by URL.
pub struct InMemoryStore {
    rows: RwLock<Rows>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Rows::default()),
        }
    }

    /// Snapshot of every stored article, in insertion order.
    pub fn all(&self) -> Vec<StoredArticle> {
        self.rows
            .read()
            .map(|rows| rows.articles.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleStore for InMemoryStore {
    async fn find_by_url(&self, url: &str) -> Result<Option<StoredArticle>> {
        let rows = self.rows.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(rows.by_url.get(url).map(|&i| rows.articles[i].clone()))
    }

    async fn upsert(&self, article: &CanonicalArticle) -> Result<UpsertOutcome> {
        let now = chrono::Utc::now().timestamp();
        let mut rows = self
            .rows
            .write()
            .map_err(|_| anyhow!("store lock poisoned"))?;

        if let Some(&i) = rows.by_url.get(&article.url) {
            let stored = &mut rows.articles[i];
            apply_update(&mut stored.article, article);
            stored.updated_at = now;
            return Ok(UpsertOutcome::Updated);
        }

        let index = rows.articles.len();
        rows.articles.push(StoredArticle {
            id: uuid::Uuid::new_v4().to_string(),
            article: article.clone(),
            created_at: now,
            updated_at: now,
        });
        rows.by_url.insert(article.url.clone(), index);
        Ok(UpsertOutcome::Inserted)
    }

    async fn articles_with_embeddings(&self) -> Result<Vec<StoredArticle>> {
        let rows = self.rows.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(rows
            .articles
            .iter()
            .filter(|s| s.article.embedding.is_some())
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let rows = self.rows.read().map_err(|_| anyhow!("store lock poisoned"))?;
        Ok(rows.articles.len())
    }
}
