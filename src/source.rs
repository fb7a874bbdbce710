//! Source adapters.
//!
//! A [`SourceAdapter`] knows how to page through one blog's listing and
//! turn each post element into a [`RawPostFragment`]. Nearly every source is
//! a [`SelectorAdapter`]: the shared fetch and extraction engine configured
//! by a [`SourceSpec`] value (selectors, date and tag rules, pagination
//! style). Sources with logic a spec cannot express implement the trait
//! directly. Either way the orchestrator re-normalizes every fragment URL
//! against [`SourceAdapter::base_url`] before deduplicating, so an adapter
//! may hand back relative or query-laden hrefs.
//!
//! # Usage
//!
//! ```rust
//! use blog_harvest::pagination::PaginationStyle;
//! use blog_harvest::source::{Selectors, SelectorAdapter, SourceAdapter, SourceSpec, TagRule};
//!
//! let spec = SourceSpec {
//!     name: "Example Engineering".to_string(),
//!     base_url: "https://eng.example.com".to_string(),
//!     pagination: PaginationStyle::NumberedPages {
//!         page_url: "https://eng.example.com/page/{page}".to_string(),
//!         first_page_url: None,
//!         max_pages: 3,
//!     },
//!     selectors: Selectors {
//!         post: "article".to_string(),
//!         title: "h2".to_string(),
//!         link: "a".to_string(),
//!         date: None,
//!         date_attr: None,
//!         summary: None,
//!     },
//!     tags: TagRule::None,
//! };
//! let adapter = SelectorAdapter::new("example", spec).unwrap();
//! let fragments = adapter.extract_fragments(
//!     r#"<article><h2>Hello</h2><a href="/hello?ref=x">read</a></article>"#,
//! );
//! assert_eq!(fragments[0].url.as_deref(), Some("https://eng.example.com/hello"));
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;
use url::Url;

use blog_harvest_core::models::RawPostFragment;

use crate::browser::PageSession;
use crate::normalize;
use crate::pagination::{PaginationController, PaginationStyle};

/// A polymorphic blog source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Registry key (e.g. `"netflix"`).
    fn key(&self) -> &str;

    /// Canonical source name stored on every article (e.g. `"Netflix Tech Blog"`).
    fn source_name(&self) -> &str;

    fn pagination(&self) -> &PaginationStyle;

    /// Base for resolving the hrefs this adapter returns.
    fn base_url(&self) -> &Url;

    /// Post elements on one page document.
    fn select_post_fragments<'a>(&self, page: &'a Html) -> Vec<ElementRef<'a>>;

    /// Raw fields of one post element.
    ///
    /// Returns `None` only when the element is unusable; missing optional
    /// fields are left empty. Title and URL are checked by the caller.
    fn parse_fragment(&self, node: ElementRef<'_>) -> Option<RawPostFragment>;

    /// Every fragment on a page document.
    ///
    /// Fragments lacking a title or a valid URL are dropped with a warning;
    /// one bad post never hides the others on the page.
    fn extract_fragments(&self, page: &str) -> Vec<RawPostFragment> {
        let document = Html::parse_document(page);
        let mut fragments = Vec::new();

        for node in self.select_post_fragments(&document) {
            match self.parse_fragment(node) {
                Some(fragment) if fragment.title.is_some() && fragment.url.is_some() => {
                    fragments.push(fragment)
                }
                Some(fragment) => warn!(
                    source = self.key(),
                    title = ?fragment.title,
                    url = ?fragment.url,
                    "Dropping post without title or valid URL"
                ),
                None => warn!(source = self.key(), "Dropping unparseable post element"),
            }
        }

        fragments
    }

    /// Load every listing page through the pagination controller.
    async fn fetch_pages(
        &self,
        session: &mut dyn PageSession,
        pacing: Duration,
    ) -> Result<Vec<String>> {
        let count = |html: &str| {
            let document = Html::parse_document(html);
            self.select_post_fragments(&document).len()
        };
        let run = PaginationController::new(self.pagination(), pacing)
            .run(session, &count)
            .await?;
        Ok(run.pages)
    }
}

/// CSS selectors locating a post and its fields.
///
/// `title`, `link`, `date`, and `summary` are evaluated inside the post
/// element. `link` must match an element carrying `href`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selectors {
    pub post: String,
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub date: Option<String>,
    /// Attribute holding the date (e.g. `datetime`); element text otherwise.
    #[serde(default)]
    pub date_attr: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Where a source publishes its own taxonomy tags.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TagRule {
    #[default]
    None,
    /// Text of every element matching the selector inside the post.
    Selector { selector: String },
    /// Classes on the post element itself with this prefix (`tag-infra` → `infra`).
    ClassPrefix { prefix: String },
}

/// The extraction strategy for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    /// Base for resolving site-relative links.
    pub base_url: String,
    pub pagination: PaginationStyle,
    pub selectors: Selectors,
    #[serde(default)]
    pub tags: TagRule,
}

struct CompiledSelectors {
    post: Selector,
    title: Selector,
    link: Selector,
    date: Option<Selector>,
    summary: Option<Selector>,
    tags: Option<Selector>,
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow::anyhow!("Invalid selector '{}': {}", selector, e))
}

/// The generic listing engine, parameterized by a [`SourceSpec`].
pub struct SelectorAdapter {
    key: String,
    spec: SourceSpec,
    base: Url,
    compiled: CompiledSelectors,
}

impl SelectorAdapter {
    /// Compile the spec's selectors. Fails on an unparseable selector or base URL.
    pub fn new(key: impl Into<String>, spec: SourceSpec) -> Result<Self> {
        let key = key.into();
        let base = Url::parse(&spec.base_url)
            .with_context(|| format!("Invalid base_url for source '{}'", key))?;

        let compiled = CompiledSelectors {
            post: compile(&spec.selectors.post)?,
            title: compile(&spec.selectors.title)?,
            link: compile(&spec.selectors.link)?,
            date: spec.selectors.date.as_deref().map(compile).transpose()?,
            summary: spec.selectors.summary.as_deref().map(compile).transpose()?,
            tags: match &spec.tags {
                TagRule::Selector { selector } => Some(compile(selector)?),
                _ => None,
            },
        };

        Ok(Self {
            key,
            spec,
            base,
            compiled,
        })
    }

    pub fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    fn first_text(node: ElementRef<'_>, selector: &Selector) -> Option<String> {
        node.select(selector)
            .next()
            .and_then(|el| normalize::non_empty(&el.text().collect::<String>()))
    }

    fn published(&self, node: ElementRef<'_>) -> Option<String> {
        let selector = self.compiled.date.as_ref()?;
        let el = node.select(selector).next()?;
        match &self.spec.selectors.date_attr {
            Some(attr) => el
                .value()
                .attr(attr)
                .and_then(normalize::non_empty)
                .or_else(|| normalize::non_empty(&el.text().collect::<String>())),
            None => normalize::non_empty(&el.text().collect::<String>()),
        }
    }

    fn source_tags(&self, node: ElementRef<'_>) -> Vec<String> {
        let mut tags: Vec<String> = match &self.spec.tags {
            TagRule::None => Vec::new(),
            TagRule::Selector { .. } => match &self.compiled.tags {
                Some(selector) => node
                    .select(selector)
                    .filter_map(|el| normalize::non_empty(&el.text().collect::<String>()))
                    .collect(),
                None => Vec::new(),
            },
            TagRule::ClassPrefix { prefix } => node
                .value()
                .attr("class")
                .unwrap_or_default()
                .split_whitespace()
                .filter_map(|class| class.strip_prefix(prefix.as_str()))
                .filter(|tag| !tag.is_empty())
                .map(|tag| tag.replace('-', " "))
                .collect(),
        };

        let mut seen = std::collections::HashSet::new();
        tags.retain(|t| seen.insert(t.to_lowercase()));
        tags
    }
}

#[async_trait]
impl SourceAdapter for SelectorAdapter {
    fn key(&self) -> &str {
        &self.key
    }

    fn source_name(&self) -> &str {
        &self.spec.name
    }

    fn pagination(&self) -> &PaginationStyle {
        &self.spec.pagination
    }

    fn base_url(&self) -> &Url {
        &self.base
    }

    fn select_post_fragments<'a>(&self, page: &'a Html) -> Vec<ElementRef<'a>> {
        page.select(&self.compiled.post).collect()
    }

    fn parse_fragment(&self, node: ElementRef<'_>) -> Option<RawPostFragment> {
        let title = Self::first_text(node, &self.compiled.title);
        let url = node
            .select(&self.compiled.link)
            .filter_map(|el| el.value().attr("href"))
            .find_map(|href| normalize::normalize_url(href, &self.base));
        let summary = self
            .compiled
            .summary
            .as_ref()
            .and_then(|selector| node.select(selector).next())
            .and_then(|el| normalize::clean_summary(&el.text().collect::<String>()));

        Some(RawPostFragment {
            title,
            url,
            published: self.published(node),
            summary,
            source_tags: self.source_tags(node),
        })
    }
}
