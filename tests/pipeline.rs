//! End-to-end pipeline tests.
//!
//! A scripted browser serves canned listing pages, a deterministic fake
//! model stands in for the embedding provider, and the in-memory store
//! records what the writer persisted.

use anyhow::{bail, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use blog_harvest::browser::{Browser, PageSession};
use blog_harvest::classify::ClassificationService;
use blog_harvest::config::TaxonomyConfig;
use blog_harvest::pagination::{PaginationController, PaginationStyle, StopReason};
use blog_harvest::retry::RetryPolicy;
use blog_harvest::scrape::{Orchestrator, ScrapeError, ScrapeOptions};
use blog_harvest::source::{SelectorAdapter, Selectors, SourceAdapter, SourceSpec, TagRule};
use blog_harvest::sources::SourceRegistry;
use blog_harvest::writer::IngestionWriter;
use blog_harvest_core::embedding::EmbeddingProvider;
use blog_harvest_core::models::{
    CanonicalArticle, RawPostFragment, StoredArticle, UpsertOutcome,
};
use blog_harvest_core::store::memory::InMemoryStore;
use blog_harvest_core::store::ArticleStore;

const DIMS: usize = 8;

// ─── Fake embedding model ───────────────────────────────────────────

/// Byte-histogram vectors: deterministic, finite, never zero. Any text
/// containing `NaNpost` embeds to NaN.
struct FakeModel;

#[async_trait]
impl EmbeddingProvider for FakeModel {
    fn model_name(&self) -> &str {
        "fake"
    }
    fn dims(&self) -> usize {
        DIMS
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                if text.contains("NaNpost") {
                    return vec![f32::NAN; DIMS];
                }
                let mut v = vec![0.0; DIMS];
                for (i, b) in text.bytes().enumerate() {
                    v[i % DIMS] += b as f32 / 255.0;
                }
                v[0] += 1.0;
                v
            })
            .collect())
    }
}

async fn service() -> Arc<ClassificationService> {
    let service = ClassificationService::initialize(
        Arc::new(FakeModel),
        &TaxonomyConfig::default(),
        "Uncategorized",
    )
    .await
    .unwrap();
    Arc::new(service)
}

// ─── Scripted browser ───────────────────────────────────────────────

#[derive(Default)]
struct ScriptedBrowser {
    pages: HashMap<String, String>,
    /// Number of `open_session` calls that fail before one succeeds.
    open_failures: AtomicUsize,
    opens: AtomicUsize,
    goto_delay: Option<Duration>,
    /// Every scroll appends another post, so the page always grows.
    grow_on_scroll: bool,
}

impl ScriptedBrowser {
    fn with_pages(pages: Vec<(String, String)>) -> Self {
        Self {
            pages: pages.into_iter().collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn open_session(&self) -> Result<Box<dyn PageSession>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let remaining = self.open_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.open_failures.store(remaining - 1, Ordering::SeqCst);
            bail!("browser crashed on launch");
        }
        Ok(Box::new(ScriptedSession {
            pages: self.pages.clone(),
            current: String::new(),
            goto_delay: self.goto_delay,
            grow_on_scroll: self.grow_on_scroll,
        }))
    }
}

struct ScriptedSession {
    pages: HashMap<String, String>,
    current: String,
    goto_delay: Option<Duration>,
    grow_on_scroll: bool,
}

#[async_trait]
impl PageSession for ScriptedSession {
    async fn goto(&mut self, url: &str) -> Result<()> {
        if let Some(delay) = self.goto_delay {
            tokio::time::sleep(delay).await;
        }
        match self.pages.get(url) {
            Some(html) => {
                self.current = html.clone();
                Ok(())
            }
            None => bail!("404 Not Found: {}", url),
        }
    }

    async fn content(&mut self) -> Result<String> {
        Ok(self.current.clone())
    }

    async fn page_height(&mut self) -> Result<u64> {
        Ok(self.current.len() as u64)
    }

    async fn scroll_to_bottom(&mut self) -> Result<()> {
        if self.grow_on_scroll {
            let n = self.current.matches("<article").count() + 1;
            let extra = post(&format!("Scrolled post {n}"), &format!("/scrolled/{n}"));
            match self.current.rfind("</body>") {
                Some(pos) => self.current.insert_str(pos, &extra),
                None => self.current.push_str(&extra),
            }
        }
        Ok(())
    }

    async fn click(&mut self, _selector: &str) -> Result<bool> {
        Ok(false)
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

fn post(title: &str, href: &str) -> String {
    format!(
        r#"<article class="post"><h2>{title}</h2><a href="{href}">Read more</a><p class="summary">Notes on {title} and distributed systems.</p><time datetime="2024-05-01">May 1</time></article>"#
    )
}

fn listing(posts: &[(&str, &str)]) -> String {
    let body: String = posts.iter().map(|(t, h)| post(t, h)).collect();
    format!("<html><body>{body}</body></html>")
}

fn selectors() -> Selectors {
    Selectors {
        post: "article.post".to_string(),
        title: "h2".to_string(),
        link: "a".to_string(),
        date: Some("time".to_string()),
        date_attr: Some("datetime".to_string()),
        summary: Some("p.summary".to_string()),
    }
}

fn numbered_source(key: &str) -> Arc<dyn SourceAdapter> {
    let spec = SourceSpec {
        name: format!("{} Engineering", key.to_uppercase()),
        base_url: "https://blog.test".to_string(),
        pagination: PaginationStyle::NumberedPages {
            page_url: format!("https://blog.test/{key}/page/{{page}}"),
            first_page_url: None,
            max_pages: 10,
        },
        selectors: selectors(),
        tags: TagRule::None,
    };
    Arc::new(SelectorAdapter::new(key, spec).unwrap())
}

fn scroll_source(key: &str, max_scrolls: u32) -> Arc<dyn SourceAdapter> {
    let spec = SourceSpec {
        name: format!("{} Tech Blog", key.to_uppercase()),
        base_url: "https://blog.test".to_string(),
        pagination: PaginationStyle::InfiniteScroll {
            seed_url: format!("https://blog.test/{key}"),
            max_scrolls,
        },
        selectors: selectors(),
        tags: TagRule::None,
    };
    Arc::new(SelectorAdapter::new(key, spec).unwrap())
}

/// `alpha`: two pages then an empty page. The second page repeats one URL
/// with a different query string.
fn alpha_pages() -> Vec<(String, String)> {
    vec![
        (
            "https://blog.test/alpha/page/1".to_string(),
            listing(&[
                ("Alpha one", "/alpha/one"),
                ("Alpha two", "/alpha/two?utm_source=rss"),
                ("Alpha three", "https://blog.test/alpha/three"),
            ]),
        ),
        (
            "https://blog.test/alpha/page/2".to_string(),
            listing(&[
                ("Alpha two again", "/alpha/two?ref=page2"),
                ("Alpha four", "/alpha/four"),
            ]),
        ),
        (
            "https://blog.test/alpha/page/3".to_string(),
            listing(&[]),
        ),
    ]
}

/// `beta`: one page; page 2 is missing.
fn beta_pages() -> Vec<(String, String)> {
    vec![(
        "https://blog.test/beta/page/1".to_string(),
        listing(&[("Beta one", "/beta/one"), ("Beta two", "/beta/two")]),
    )]
}

/// An adapter whose listing can never be loaded.
struct ExplodingAdapter {
    pagination: PaginationStyle,
    base: Url,
}

impl ExplodingAdapter {
    fn new() -> Self {
        Self {
            pagination: PaginationStyle::NumberedPages {
                page_url: "https://blog.test/broken/page/{page}".to_string(),
                first_page_url: None,
                max_pages: 3,
            },
            base: Url::parse("https://blog.test/broken/").unwrap(),
        }
    }
}

#[async_trait]
impl SourceAdapter for ExplodingAdapter {
    fn key(&self) -> &str {
        "broken"
    }
    fn source_name(&self) -> &str {
        "Broken Blog"
    }
    fn pagination(&self) -> &PaginationStyle {
        &self.pagination
    }
    fn base_url(&self) -> &Url {
        &self.base
    }
    fn select_post_fragments<'a>(&self, _page: &'a Html) -> Vec<ElementRef<'a>> {
        Vec::new()
    }
    fn parse_fragment(&self, _node: ElementRef<'_>) -> Option<RawPostFragment> {
        None
    }
    async fn fetch_pages(
        &self,
        _session: &mut dyn PageSession,
        _pacing: Duration,
    ) -> Result<Vec<String>> {
        bail!("listing markup changed")
    }
}

/// A feed-style source implementing the trait by hand: it returns hrefs
/// exactly as its feed publishes them, without normalizing.
struct FeedAdapter {
    pagination: PaginationStyle,
    base: Url,
    hrefs: Vec<(&'static str, &'static str)>,
}

impl FeedAdapter {
    fn new(hrefs: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            pagination: PaginationStyle::NumberedPages {
                page_url: "https://blog.test/feed/{page}".to_string(),
                first_page_url: None,
                max_pages: 1,
            },
            base: Url::parse("https://blog.test/").unwrap(),
            hrefs,
        }
    }
}

#[async_trait]
impl SourceAdapter for FeedAdapter {
    fn key(&self) -> &str {
        "feed"
    }
    fn source_name(&self) -> &str {
        "Feed Blog"
    }
    fn pagination(&self) -> &PaginationStyle {
        &self.pagination
    }
    fn base_url(&self) -> &Url {
        &self.base
    }
    fn select_post_fragments<'a>(&self, _page: &'a Html) -> Vec<ElementRef<'a>> {
        Vec::new()
    }
    fn parse_fragment(&self, _node: ElementRef<'_>) -> Option<RawPostFragment> {
        None
    }
    fn extract_fragments(&self, _page: &str) -> Vec<RawPostFragment> {
        self.hrefs
            .iter()
            .map(|(title, href)| RawPostFragment {
                title: Some(title.to_string()),
                url: Some(href.to_string()),
                published: None,
                summary: None,
                source_tags: Vec::new(),
            })
            .collect()
    }
    async fn fetch_pages(
        &self,
        _session: &mut dyn PageSession,
        _pacing: Duration,
    ) -> Result<Vec<String>> {
        Ok(vec![String::new()])
    }
}

fn options() -> ScrapeOptions {
    ScrapeOptions {
        pacing: Duration::ZERO,
        source_timeout: Duration::from_secs(30),
        parallelism: 2,
        top_n_tags: 5,
        limit: None,
        retry: RetryPolicy::new(2, Duration::ZERO),
    }
}

fn writer(store: Arc<dyn ArticleStore>) -> IngestionWriter {
    IngestionWriter::new(store, RetryPolicy::new(3, Duration::ZERO), DIMS)
}

fn registry(adapters: Vec<Arc<dyn SourceAdapter>>) -> SourceRegistry {
    let mut registry = SourceRegistry::new();
    for adapter in adapters {
        registry.register(adapter);
    }
    registry
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_rescrape_updates_instead_of_duplicating() {
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("alpha")]),
        Arc::new(ScriptedBrowser::with_pages(alpha_pages())),
        service().await,
        Some(writer(store.clone())),
        options(),
    );

    let first = orchestrator.scrape_source("alpha").await.unwrap();
    assert!(first.success, "first run failed: {:?}", first.error);
    assert_eq!(first.counts.inserted, 4);
    assert_eq!(store.count().await.unwrap(), 4);

    let second = orchestrator.scrape_source("alpha").await.unwrap();
    assert!(second.success);
    assert_eq!(second.counts.inserted, 0);
    assert_eq!(second.counts.updated, 4);
    assert_eq!(store.count().await.unwrap(), 4);
}

#[tokio::test]
async fn test_query_string_variants_store_one_record() {
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("alpha")]),
        Arc::new(ScriptedBrowser::with_pages(alpha_pages())),
        service().await,
        Some(writer(store.clone())),
        options(),
    );

    let outcome = orchestrator.scrape_source("alpha").await.unwrap();
    assert_eq!(outcome.counts.fragments, 4);

    let stored = store
        .find_by_url("https://blog.test/alpha/two")
        .await
        .unwrap()
        .expect("deduplicated article stored");
    assert_eq!(stored.article.title, "Alpha two");
    assert_eq!(stored.article.source, "ALPHA Engineering");
    assert!(stored.article.published_date.is_some());

    let urls: Vec<String> = store.all().into_iter().map(|a| a.article.url).collect();
    assert_eq!(
        urls.iter()
            .filter(|u| u.starts_with("https://blog.test/alpha/two"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_hand_written_adapter_urls_are_normalized_before_dedup() {
    let adapter: Arc<dyn SourceAdapter> = Arc::new(FeedAdapter::new(vec![
        ("Feed one", "https://blog.test/alpha/one"),
        ("Feed two", "https://blog.test/alpha/two?utm_source=rss"),
        ("Feed two again", "/alpha/two?ref=page2"),
        ("Feed three", "https://blog.testhttps://blog.test/alpha/three"),
        ("Feed four", "/alpha/four#comments"),
    ]));
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        registry(vec![adapter]),
        Arc::new(ScriptedBrowser::with_pages(Vec::new())),
        service().await,
        Some(writer(store.clone())),
        options(),
    );

    let outcome = orchestrator.scrape_source("feed").await.unwrap();
    assert!(outcome.success, "feed run failed: {:?}", outcome.error);
    assert_eq!(outcome.counts.fragments, 3);
    assert_eq!(outcome.counts.inserted, 3);
    assert_eq!(outcome.counts.dropped, 1);

    let mut urls: Vec<String> = store.all().into_iter().map(|a| a.article.url).collect();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "https://blog.test/alpha/four",
            "https://blog.test/alpha/one",
            "https://blog.test/alpha/two",
        ]
    );
    let two = store
        .find_by_url("https://blog.test/alpha/two")
        .await
        .unwrap()
        .expect("first variant stored");
    assert_eq!(two.article.title, "Feed two");
}

#[tokio::test]
async fn test_invalid_embedding_is_dropped_not_stored() {
    let pages = vec![(
        "https://blog.test/alpha/page/1".to_string(),
        listing(&[("Healthy post", "/alpha/ok"), ("NaNpost", "/alpha/nan")]),
    )];
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("alpha")]),
        Arc::new(ScriptedBrowser::with_pages(pages)),
        service().await,
        Some(writer(store.clone())),
        options(),
    );

    let outcome = orchestrator.scrape_source("alpha").await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.counts.inserted, 1);
    assert_eq!(outcome.counts.dropped, 1);
    assert!(store
        .find_by_url("https://blog.test/alpha/nan")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_scrape_all_isolates_failing_source() {
    let mut pages = alpha_pages();
    pages.extend(beta_pages());
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = Orchestrator::new(
        registry(vec![
            numbered_source("alpha"),
            Arc::new(ExplodingAdapter::new()),
            numbered_source("beta"),
        ]),
        Arc::new(ScriptedBrowser::with_pages(pages)),
        service().await,
        Some(writer(store.clone())),
        options(),
    );

    let outcomes = orchestrator.scrape_all().await;
    let keys: Vec<&str> = outcomes.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["alpha", "broken", "beta"]);

    assert!(outcomes[0].success);
    assert!(outcomes[2].success);
    assert!(!outcomes[1].success);
    let error = outcomes[1].error.as_deref().unwrap_or_default();
    assert!(error.contains("listing markup changed"), "error: {error}");

    let inserted: usize = outcomes.iter().map(|o| o.counts.inserted).sum();
    assert_eq!(inserted, 6);
    assert_eq!(store.count().await.unwrap(), 6);
}

#[tokio::test]
async fn test_dry_run_enriches_without_writing() {
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("alpha")]),
        Arc::new(ScriptedBrowser::with_pages(alpha_pages())),
        service().await,
        None,
        options(),
    );

    let outcome = orchestrator.scrape_source("alpha").await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.articles.len(), 4);
    assert_eq!(outcome.counts.written(), 0);
    for article in &outcome.articles {
        assert_eq!(article.embedding.as_ref().map(Vec::len), Some(DIMS));
        assert!(!article.category.is_empty());
    }
}

#[tokio::test]
async fn test_limit_caps_fragments() {
    let mut opts = options();
    opts.limit = Some(2);
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("alpha")]),
        Arc::new(ScriptedBrowser::with_pages(alpha_pages())),
        service().await,
        None,
        opts,
    );

    let outcome = orchestrator.scrape_source("alpha").await.unwrap();
    assert_eq!(outcome.counts.fragments, 2);
    assert_eq!(outcome.articles.len(), 2);
}

#[tokio::test]
async fn test_unknown_source_is_an_error() {
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("alpha")]),
        Arc::new(ScriptedBrowser::default()),
        service().await,
        None,
        options(),
    );

    match orchestrator.scrape_source("nope").await {
        Err(ScrapeError::UnknownSource { key, available }) => {
            assert_eq!(key, "nope");
            assert_eq!(available, "alpha");
        }
        other => panic!("expected UnknownSource, got {:?}", other.map(|o| o.key)),
    }
}

#[tokio::test]
async fn test_session_startup_is_retried() {
    let browser = Arc::new(ScriptedBrowser {
        open_failures: AtomicUsize::new(2),
        ..ScriptedBrowser::with_pages(beta_pages())
    });
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("beta")]),
        browser.clone(),
        service().await,
        None,
        options(),
    );

    let outcome = orchestrator.scrape_source("beta").await.unwrap();
    assert!(outcome.success, "error: {:?}", outcome.error);
    assert_eq!(browser.opens.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_session_startup_exhaustion_fails_source() {
    let browser = Arc::new(ScriptedBrowser {
        open_failures: AtomicUsize::new(usize::MAX),
        ..ScriptedBrowser::default()
    });
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("beta")]),
        browser.clone(),
        service().await,
        None,
        options(),
    );

    let outcome = orchestrator.scrape_source("beta").await.unwrap();
    assert!(!outcome.success);
    assert_eq!(browser.opens.load(Ordering::SeqCst), 3);
    let error = outcome.error.unwrap_or_default();
    assert!(error.contains("page session"), "error: {error}");
    assert!(error.contains("browser crashed on launch"), "error: {error}");
}

/// Rejects every write.
struct DownStore {
    attempts: AtomicUsize,
}

#[async_trait]
impl ArticleStore for DownStore {
    async fn find_by_url(&self, _url: &str) -> Result<Option<StoredArticle>> {
        Ok(None)
    }
    async fn upsert(&self, _article: &CanonicalArticle) -> Result<UpsertOutcome> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        bail!("database is locked")
    }
    async fn articles_with_embeddings(&self) -> Result<Vec<StoredArticle>> {
        Ok(Vec::new())
    }
    async fn count(&self) -> Result<usize> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_write_exhaustion_fails_source_with_store_error() {
    let store = Arc::new(DownStore {
        attempts: AtomicUsize::new(0),
    });
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("beta")]),
        Arc::new(ScriptedBrowser::with_pages(beta_pages())),
        service().await,
        Some(writer(store.clone())),
        options(),
    );

    let outcome = orchestrator.scrape_source("beta").await.unwrap();
    assert!(!outcome.success);
    // One article, four attempts, then the source stops.
    assert_eq!(store.attempts.load(Ordering::SeqCst), 4);
    let error = outcome.error.unwrap_or_default();
    assert!(error.contains("database is locked"), "error: {error}");
}

#[tokio::test]
async fn test_source_deadline() {
    let browser = Arc::new(ScriptedBrowser {
        goto_delay: Some(Duration::from_secs(10)),
        ..ScriptedBrowser::with_pages(beta_pages())
    });
    let mut opts = options();
    opts.source_timeout = Duration::from_millis(100);
    let orchestrator = Orchestrator::new(
        registry(vec![numbered_source("beta")]),
        browser,
        service().await,
        None,
        opts,
    );

    let outcome = orchestrator.scrape_source("beta").await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.unwrap_or_default().contains("deadline"));
}

#[tokio::test]
async fn test_static_scroll_stops_after_first_page() {
    let pages = vec![(
        "https://blog.test/gamma".to_string(),
        listing(&[
            ("Gamma one", "/gamma/one"),
            ("Gamma two", "/gamma/two"),
            ("Gamma three", "/gamma/three"),
        ]),
    )];
    let browser = ScriptedBrowser::with_pages(pages);
    let adapter = scroll_source("gamma", 50);

    let mut session = browser.open_session().await.unwrap();
    let count = |html: &str| html.matches("<article").count();
    let run = PaginationController::new(adapter.pagination(), Duration::ZERO)
        .run(session.as_mut(), &count)
        .await
        .unwrap();

    assert_eq!(run.stop, StopReason::NoNewContent);
    assert_eq!(run.actions, 1);
    assert_eq!(adapter.extract_fragments(&run.pages[0]).len(), 3);
}

#[tokio::test]
async fn test_endless_scroll_stops_at_ceiling() {
    let pages = vec![(
        "https://blog.test/gamma".to_string(),
        listing(&[("Gamma one", "/gamma/one")]),
    )];
    let browser = ScriptedBrowser {
        grow_on_scroll: true,
        ..ScriptedBrowser::with_pages(pages)
    };
    let adapter = scroll_source("gamma", 7);

    let mut session = browser.open_session().await.unwrap();
    let count = |html: &str| html.matches("<article").count();
    let run = PaginationController::new(adapter.pagination(), Duration::ZERO)
        .run(session.as_mut(), &count)
        .await
        .unwrap();

    assert_eq!(run.stop, StopReason::CeilingReached);
    assert_eq!(run.actions, 7);
    // The seed post plus one per scroll.
    assert_eq!(adapter.extract_fragments(&run.pages[0]).len(), 8);
}
