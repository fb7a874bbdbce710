//! Fragment enrichment.
//!
//! [`ArticleEnricher`] turns a [`RawPostFragment`] into a
//! [`CanonicalArticle`]: tags, category, and a content embedding are
//! derived from the fragment's title and summary. An article whose
//! embedding cannot be computed is dropped; nothing is stored without a
//! valid vector.

use std::sync::Arc;
use tracing::{debug, warn};

use blog_harvest_core::models::{CanonicalArticle, RawPostFragment};

use crate::classify::ClassificationService;
use crate::normalize;

pub struct ArticleEnricher {
    service: Arc<ClassificationService>,
    top_n: usize,
    source_name: String,
}

impl ArticleEnricher {
    pub fn new(service: Arc<ClassificationService>, top_n: usize, source_name: impl Into<String>) -> Self {
        Self {
            service,
            top_n,
            source_name: source_name.into(),
        }
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Enrich one fragment. Returns `None` when the fragment lacks a title
    /// or URL, or when the composite embedding fails validation.
    pub async fn enrich(&self, fragment: &RawPostFragment) -> Option<CanonicalArticle> {
        let title = fragment.title.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
        let url = fragment.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let summary = fragment
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let tag_text = match summary {
            Some(summary) => format!("{title}. {summary}"),
            None => title.to_string(),
        };
        let mut tags = self.service.extract_tags(&tag_text, self.top_n).await;
        if !fragment.source_tags.is_empty() {
            tags = dedup_preserving_order(&fragment.source_tags);
        }

        let category = self.service.classify(title, summary).await;

        let embedding_text = composite_text(title, &category, &tags, &self.source_name);
        let embedding = match self.service.embed(&embedding_text).await {
            Ok(vector) => vector,
            Err(e) => {
                warn!(url, error = %e, "Dropping article without a valid embedding");
                return None;
            }
        };

        let published_date = fragment.published.as_deref().and_then(|raw| {
            let parsed = normalize::parse_published(raw);
            if parsed.is_none() {
                debug!(url, raw, "Unparseable published date");
            }
            parsed
        });

        Some(CanonicalArticle {
            url: url.to_string(),
            title: title.to_string(),
            published_date,
            source: self.source_name.clone(),
            tags,
            category,
            embedding: Some(embedding),
            summary: summary.map(str::to_string),
            content: None,
        })
    }
}

/// Text embedded for search: title, category, tags, then source name.
pub fn composite_text(title: &str, category: &str, tags: &[String], source_name: &str) -> String {
    format!(
        "Title: {}. Category: {}. Tags: {} {}",
        title,
        category,
        tags.join(", "),
        source_name
    )
}

fn dedup_preserving_order(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}
