//! Ingestion writer: URL-keyed upsert behind a retry policy.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

use blog_harvest_core::embedding::validate_embedding;
use blog_harvest_core::models::{CanonicalArticle, UpsertOutcome};
use blog_harvest_core::store::ArticleStore;

use crate::normalize;
use crate::retry::RetryPolicy;

/// Writes enriched articles into an [`ArticleStore`].
///
/// Articles that fail the writer's own guard (URL not in normalized form, empty
/// title, missing or invalid embedding) are never written and come back as
/// [`UpsertOutcome::Skipped`]. Store errors are retried by the policy; once
/// the attempts are exhausted the last store error is returned.
pub struct IngestionWriter {
    store: Arc<dyn ArticleStore>,
    retry: RetryPolicy,
    dims: usize,
}

impl IngestionWriter {
    pub fn new(store: Arc<dyn ArticleStore>, retry: RetryPolicy, dims: usize) -> Self {
        Self { store, retry, dims }
    }

    pub fn store(&self) -> &Arc<dyn ArticleStore> {
        &self.store
    }

    pub async fn write(&self, article: &CanonicalArticle) -> Result<UpsertOutcome> {
        if let Some(reason) = self.reject_reason(article) {
            warn!(url = %article.url, reason, "Skipping article");
            return Ok(UpsertOutcome::Skipped);
        }

        let store = &self.store;
        let outcome = self
            .retry
            .run("upsert", || store.upsert(article))
            .await?;
        debug!(url = %article.url, ?outcome, "Article written");
        Ok(outcome)
    }

    fn reject_reason(&self, article: &CanonicalArticle) -> Option<String> {
        if !normalize::is_canonical_url(&article.url) {
            return Some("url is not a normalized absolute http(s) url".to_string());
        }
        if article.title.trim().is_empty() {
            return Some("empty title".to_string());
        }
        match &article.embedding {
            None => Some("missing embedding".to_string()),
            Some(vector) => validate_embedding(vector, self.dims)
                .err()
                .map(|e| e.to_string()),
        }
    }
}
