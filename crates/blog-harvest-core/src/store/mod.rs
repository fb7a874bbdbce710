//! Content store abstraction.
//!
//! The [`ArticleStore`] trait is the pipeline's only view of persistence:
//! an existence lookup by URL, an insert-or-update keyed by URL, and the
//! bulk read of embedded articles consumed by search and recommendation.
//!
//! Implementations must make [`upsert`](ArticleStore::upsert) atomic per
//! URL: two concurrent upserts of the same URL may not produce two rows.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CanonicalArticle, StoredArticle, UpsertOutcome};

/// Abstract storage backend for canonical articles.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_by_url`](ArticleStore::find_by_url) | Existence check / fetch by identity key |
/// | [`upsert`](ArticleStore::upsert) | Insert if absent, else refresh mutable fields |
/// | [`articles_with_embeddings`](ArticleStore::articles_with_embeddings) | Bulk read for search |
/// | [`count`](ArticleStore::count) | Total stored articles |
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Look up a stored article by its normalized URL.
    async fn find_by_url(&self, url: &str) -> Result<Option<StoredArticle>>;

    /// Insert the article, or update the existing row with the same URL.
    ///
    /// Returns [`UpsertOutcome::Inserted`] or [`UpsertOutcome::Updated`].
    /// Identity (`id`, `url`, `created_at`) is never rewritten.
    async fn upsert(&self, article: &CanonicalArticle) -> Result<UpsertOutcome>;

    /// All stored articles that carry an embedding, oldest first.
    async fn articles_with_embeddings(&self) -> Result<Vec<StoredArticle>>;

    /// Number of stored articles.
    async fn count(&self) -> Result<usize>;
}

/// Apply a re-scrape of the same URL to a stored record.
///
/// Title, source, tags, category, and embedding are replaced. Published
/// date, summary, and content keep their stored value when the incoming
/// article has none. The URL is left untouched.
pub fn apply_update(existing: &mut CanonicalArticle, incoming: &CanonicalArticle) {
    existing.title = incoming.title.clone();
    existing.source = incoming.source.clone();
    existing.tags = incoming.tags.clone();
    existing.category = incoming.category.clone();
    if incoming.embedding.is_some() {
        existing.embedding = incoming.embedding.clone();
    }
    if incoming.published_date.is_some() {
        existing.published_date = incoming.published_date;
    }
    if incoming.summary.is_some() {
        existing.summary = incoming.summary.clone();
    }
    if incoming.content.is_some() {
        existing.content = incoming.content.clone();
    }
}
