//! Core data models that flow through the ingestion pipeline.
//!
//! A scrape pass turns each post on a listing page into a
//! [`RawPostFragment`], the enricher turns surviving fragments into
//! [`CanonicalArticle`]s, and the writer persists those keyed by URL.
//! Each source run ends in one [`ScrapeOutcome`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category assigned when classification cannot run.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Raw fields extracted from one post on a listing page, before enrichment.
///
/// Every field may be missing: markup drifts, and a selector that matches
/// nothing is treated as "not found" rather than as an error. The URL has
/// already been normalized by the adapter when present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPostFragment {
    pub title: Option<String>,
    pub url: Option<String>,
    /// Published marker as it appeared in the markup (ISO date, `datetime`
    /// attribute, or display text such as `"May 6, 2025"`).
    pub published: Option<String>,
    pub summary: Option<String>,
    /// Taxonomy tags supplied by the source itself (category badges,
    /// `tag-*` classes). When non-empty they replace extracted keyphrases.
    #[serde(default)]
    pub source_tags: Vec<String>,
}

/// The persisted unit, keyed by its normalized absolute URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalArticle {
    pub url: String,
    pub title: String,
    pub published_date: Option<DateTime<Utc>>,
    /// Canonical source name (e.g. `"Netflix Tech Blog"`), never the alias.
    pub source: String,
    pub tags: Vec<String>,
    pub category: String,
    pub embedding: Option<Vec<f32>>,
    pub summary: Option<String>,
    pub content: Option<String>,
}

/// An article as held by a content store, with store-assigned identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredArticle {
    pub id: String,
    #[serde(flatten)]
    pub article: CanonicalArticle,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Result of writing one article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Per-source tallies of what happened to each scraped post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestCounts {
    /// Fragments extracted from listing pages (after in-run URL dedup).
    pub fragments: usize,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Fragments that never became an article (missing fields or no embedding).
    pub dropped: usize,
}

impl IngestCounts {
    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }

    /// Articles that reached the store (inserted or updated).
    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn merge(&mut self, other: &IngestCounts) {
        self.fragments += other.fragments;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.dropped += other.dropped;
    }
}

/// Result of one source run, consumed by the orchestrator's report.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeOutcome {
    /// Registry key (e.g. `"netflix"`).
    pub key: String,
    /// Canonical source name.
    pub source: String,
    pub success: bool,
    #[serde(skip)]
    pub articles: Vec<CanonicalArticle>,
    pub counts: IngestCounts,
    pub error: Option<String>,
    pub elapsed_ms: u64,
}

impl ScrapeOutcome {
    pub fn succeeded(
        key: impl Into<String>,
        source: impl Into<String>,
        articles: Vec<CanonicalArticle>,
        counts: IngestCounts,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            success: true,
            articles,
            counts,
            error: None,
            elapsed_ms,
        }
    }

    pub fn failed(
        key: impl Into<String>,
        source: impl Into<String>,
        counts: IngestCounts,
        error: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            key: key.into(),
            source: source.into(),
            success: false,
            articles: Vec::new(),
            counts,
            error: Some(error.into()),
            elapsed_ms,
        }
    }
}
