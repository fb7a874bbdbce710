//! Scrape orchestration.
//!
//! Runs the full pipeline for one source or for every enabled source:
//!
//! ```text
//! open session (retried) → paginate → extract fragments
//!     → normalize URLs → dedup by URL
//!     → enrich → write (retried) → ScrapeOutcome
//! ```
//!
//! Each source run is bounded by a wall-clock deadline. A source that fails
//! for any reason becomes a failed [`ScrapeOutcome`]; it never stops the
//! remaining sources, and "scrape all" always reports on every source.

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use blog_harvest_core::models::{
    CanonicalArticle, IngestCounts, RawPostFragment, ScrapeOutcome, UpsertOutcome,
};

use crate::browser::{self, Browser};
use crate::classify::ClassificationService;
use crate::config::Config;
use crate::embedding;
use crate::enrich::ArticleEnricher;
use crate::normalize;
use crate::retry::RetryPolicy;
use crate::source::SourceAdapter;
use crate::sources::SourceRegistry;
use crate::sqlite_store::SqliteStore;
use crate::writer::IngestionWriter;

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("unknown source '{key}'. Available: {available}")]
    UnknownSource { key: String, available: String },
    #[error("source '{key}' exceeded its {secs}s deadline")]
    Timeout { key: String, secs: u64 },
    #[error("could not start a page session: {0}")]
    Session(String),
}

/// Knobs for a scrape run.
#[derive(Debug, Clone)]
pub struct ScrapeOptions {
    /// Delay between pagination actions.
    pub pacing: Duration,
    /// Deadline for one whole source run.
    pub source_timeout: Duration,
    /// Sources scraped concurrently by [`Orchestrator::scrape_all`].
    pub parallelism: usize,
    pub top_n_tags: usize,
    /// Cap on fragments enriched per source.
    pub limit: Option<usize>,
    /// Applied to page-session startup.
    pub retry: RetryPolicy,
}

impl ScrapeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pacing: Duration::from_millis(config.scrape.pacing_ms),
            source_timeout: Duration::from_secs(config.scrape.source_timeout_secs),
            parallelism: config.scrape.parallelism,
            top_n_tags: config.enrichment.top_n_tags,
            limit: None,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

pub struct Orchestrator {
    registry: SourceRegistry,
    browser: Arc<dyn Browser>,
    service: Arc<ClassificationService>,
    /// `None` for dry runs: articles are enriched but never written.
    writer: Option<IngestionWriter>,
    options: ScrapeOptions,
}

impl Orchestrator {
    pub fn new(
        registry: SourceRegistry,
        browser: Arc<dyn Browser>,
        service: Arc<ClassificationService>,
        writer: Option<IngestionWriter>,
        options: ScrapeOptions,
    ) -> Self {
        Self {
            registry,
            browser,
            service,
            writer,
            options,
        }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Scrape one named source, enabled or not.
    pub async fn scrape_source(&self, key: &str) -> Result<ScrapeOutcome, ScrapeError> {
        let adapter = self
            .registry
            .get(key)
            .ok_or_else(|| ScrapeError::UnknownSource {
                key: key.to_string(),
                available: self.registry.keys().join(", "),
            })?;
        Ok(self.run_source(adapter.as_ref()).await)
    }

    /// Scrape every enabled source, `parallelism` at a time.
    ///
    /// Outcomes are returned in registry order, one per source.
    pub async fn scrape_all(&self) -> Vec<ScrapeOutcome> {
        let adapters = self.registry.enabled();
        stream::iter(adapters)
            .map(|adapter| async move { self.run_source(adapter.as_ref()).await })
            .buffered(self.options.parallelism.max(1))
            .collect()
            .await
    }

    /// One source run under its deadline, folded into an outcome.
    async fn run_source(&self, adapter: &dyn SourceAdapter) -> ScrapeOutcome {
        let key = adapter.key();
        let source = adapter.source_name();
        info!(source = key, style = adapter.pagination().kind(), "Scrape started");

        let started = Instant::now();
        let mut counts = IngestCounts::default();
        let mut articles = Vec::new();

        let result = tokio::time::timeout(
            self.options.source_timeout,
            self.run_pipeline(adapter, &mut counts, &mut articles),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ScrapeError::Timeout {
                key: key.to_string(),
                secs: self.options.source_timeout.as_secs(),
            }
            .into())
        });
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(
                    source = key,
                    fragments = counts.fragments,
                    inserted = counts.inserted,
                    updated = counts.updated,
                    skipped = counts.skipped,
                    dropped = counts.dropped,
                    elapsed_ms,
                    "Scrape finished"
                );
                ScrapeOutcome::succeeded(key, source, articles, counts, elapsed_ms)
            }
            Err(e) => {
                let message = format!("{e:#}");
                error!(source = key, error = %message, "Scrape failed");
                ScrapeOutcome::failed(key, source, counts, message, elapsed_ms)
            }
        }
    }

    async fn run_pipeline(
        &self,
        adapter: &dyn SourceAdapter,
        counts: &mut IngestCounts,
        articles: &mut Vec<CanonicalArticle>,
    ) -> Result<()> {
        let browser = &self.browser;
        let mut session = self
            .options
            .retry
            .run("open page session", || browser.open_session())
            .await
            .map_err(|e| ScrapeError::Session(format!("{e:#}")))?;

        let pages = adapter.fetch_pages(session.as_mut(), self.options.pacing).await;
        if let Err(e) = session.close().await {
            debug!(source = adapter.key(), error = %e, "Page session did not close cleanly");
        }
        let pages =
            pages.with_context(|| format!("Failed to load listing for {}", adapter.key()))?;

        let (mut fragments, rejected) = canonical_fragments(
            adapter.base_url(),
            pages.iter().flat_map(|page| adapter.extract_fragments(page)),
        );
        if rejected > 0 {
            warn!(source = adapter.key(), rejected, "Dropped fragments without a usable URL");
        }
        counts.dropped += rejected;
        if let Some(limit) = self.options.limit {
            fragments.truncate(limit);
        }
        counts.fragments = fragments.len();
        debug!(
            source = adapter.key(),
            pages = pages.len(),
            fragments = fragments.len(),
            "Fragments extracted"
        );

        let enricher = ArticleEnricher::new(
            Arc::clone(&self.service),
            self.options.top_n_tags,
            adapter.source_name(),
        );

        for fragment in &fragments {
            let Some(article) = enricher.enrich(fragment).await else {
                counts.dropped += 1;
                continue;
            };
            match &self.writer {
                Some(writer) => {
                    let outcome = writer
                        .write(&article)
                        .await
                        .with_context(|| format!("Failed to write {}", article.url))?;
                    counts.record(outcome);
                    if outcome != UpsertOutcome::Skipped {
                        articles.push(article);
                    }
                }
                None => articles.push(article),
            }
        }

        Ok(())
    }
}

/// Normalize every fragment URL against `base` and keep the first fragment
/// for each normalized URL, in page order.
///
/// Returns the survivors and the number of fragments whose URL was missing
/// or could not be normalized.
fn canonical_fragments(
    base: &Url,
    fragments: impl Iterator<Item = RawPostFragment>,
) -> (Vec<RawPostFragment>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut rejected = 0;

    for mut fragment in fragments {
        let Some(url) = fragment
            .url
            .as_deref()
            .and_then(|raw| normalize::normalize_url(raw, base))
        else {
            debug!(url = ?fragment.url, "Rejected fragment URL");
            rejected += 1;
            continue;
        };
        if seen.insert(url.clone()) {
            fragment.url = Some(url);
            unique.push(fragment);
        }
    }

    (unique, rejected)
}

/// Outcomes of one `harvest scrape` invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeReport {
    pub dry_run: bool,
    pub outcomes: Vec<ScrapeOutcome>,
}

impl ScrapeReport {
    pub fn totals(&self) -> IngestCounts {
        let mut totals = IngestCounts::default();
        for outcome in &self.outcomes {
            totals.merge(&outcome.counts);
        }
        totals
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    pub fn print(&self) {
        println!("scrape{}", if self.dry_run { " (dry-run)" } else { "" });
        for o in &self.outcomes {
            let status = if o.success { "ok" } else { "FAILED" };
            println!("  {} ({}): {}", o.key, o.source, status);
            println!("    fragments: {}", o.counts.fragments);
            if self.dry_run {
                println!("    enriched:  {}", o.articles.len());
            } else {
                println!(
                    "    inserted: {}  updated: {}  skipped: {}",
                    o.counts.inserted, o.counts.updated, o.counts.skipped
                );
            }
            println!("    dropped:   {}", o.counts.dropped);
            println!("    elapsed:   {:.1}s", o.elapsed_ms as f64 / 1000.0);
            if let Some(err) = &o.error {
                println!("    error: {}", err);
            }
        }

        let totals = self.totals();
        println!();
        println!(
            "  sources: {} ({} failed)",
            self.outcomes.len(),
            self.failed()
        );
        println!(
            "  total inserted: {}  updated: {}  dropped: {}",
            totals.inserted, totals.updated, totals.dropped
        );
    }
}

/// `harvest scrape <key|all>`.
///
/// Unknown keys are an error; failures inside a source are reported, not
/// returned.
pub async fn run_scrape(
    config: &Config,
    target: &str,
    dry_run: bool,
    limit: Option<usize>,
) -> Result<ScrapeReport> {
    let registry = SourceRegistry::from_config(config)?;
    if target != "all" && !registry.contains(target) {
        return Err(ScrapeError::UnknownSource {
            key: target.to_string(),
            available: registry.keys().join(", "),
        }
        .into());
    }
    if !config.embedding.is_enabled() {
        anyhow::bail!(
            "Scraping requires an embedding provider. Set [embedding] provider in your config."
        );
    }

    let provider = embedding::create_provider(&config.embedding).await?;
    let service = ClassificationService::initialize(
        provider,
        &config.taxonomy,
        &config.enrichment.default_category,
    )
    .await?;
    let browser = browser::create_browser(&config.scrape)?;

    let writer = if dry_run {
        None
    } else {
        let store = SqliteStore::connect(config).await?;
        Some(IngestionWriter::new(
            Arc::new(store),
            RetryPolicy::from_config(&config.retry),
            config.embedding.dims,
        ))
    };

    let mut options = ScrapeOptions::from_config(config);
    options.limit = limit;
    let orchestrator = Orchestrator::new(registry, browser, Arc::new(service), writer, options);

    let outcomes = if target == "all" {
        orchestrator.scrape_all().await
    } else {
        vec![orchestrator.scrape_source(target).await?]
    };

    let report = ScrapeReport { dry_run, outcomes };
    report.print();
    Ok(report)
}
