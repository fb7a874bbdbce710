//! Built-in source registry.
//!
//! Each built-in source is a key mapped to a constructor returning its
//! [`SourceSpec`]. [`SourceRegistry::from_config`] resolves the table once
//! at startup, applies `[sources.<key>]` overrides, appends custom sources,
//! and hands out shared adapter trait objects.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::config::Config;
use crate::pagination::PaginationStyle;
use crate::source::{SelectorAdapter, Selectors, SourceAdapter, SourceSpec, TagRule};

type SpecConstructor = fn() -> SourceSpec;

/// Built-in sources in registry (and `scrape all`) order.
pub const BUILTIN_SOURCES: &[(&str, SpecConstructor)] = &[
    ("netflix", netflix),
    ("airbnb", airbnb),
    ("tinder", tinder),
    ("stripe", stripe),
    ("uber", uber),
    ("slack", slack),
    ("notion", notion),
    ("robinhood", robinhood),
    ("doordash", doordash),
    ("meta", meta),
];

fn selectors(post: &str, title: &str, link: &str) -> Selectors {
    Selectors {
        post: post.to_string(),
        title: title.to_string(),
        link: link.to_string(),
        date: None,
        date_attr: None,
        summary: None,
    }
}

fn dated(mut s: Selectors, date: &str, attr: Option<&str>) -> Selectors {
    s.date = Some(date.to_string());
    s.date_attr = attr.map(str::to_string);
    s
}

fn summarized(mut s: Selectors, summary: &str) -> Selectors {
    s.summary = Some(summary.to_string());
    s
}

fn tag_selector(selector: &str) -> TagRule {
    TagRule::Selector {
        selector: selector.to_string(),
    }
}

fn netflix() -> SourceSpec {
    SourceSpec {
        name: "Netflix Tech Blog".to_string(),
        base_url: "https://netflixtechblog.com".to_string(),
        pagination: PaginationStyle::InfiniteScroll {
            seed_url: "https://netflixtechblog.com".to_string(),
            max_scrolls: 50,
        },
        selectors: dated(
            selectors(
                "div.col.u-xs-size12of12.js-trackPostPresentation",
                "h3 > div",
                "a[href]",
            ),
            "time",
            Some("datetime"),
        ),
        tags: TagRule::None,
    }
}

fn medium_publication(name: &str, slug: &str, link: &str) -> SourceSpec {
    let seed = format!("https://medium.com/{slug}");
    SourceSpec {
        name: name.to_string(),
        base_url: seed.clone(),
        pagination: PaginationStyle::InfiniteScroll {
            seed_url: seed,
            max_scrolls: 30,
        },
        selectors: dated(
            selectors("div[data-post-id]", "h3 > div", link),
            "time",
            Some("datetime"),
        ),
        tags: TagRule::None,
    }
}

fn airbnb() -> SourceSpec {
    medium_publication(
        "Airbnb Engineering Blog",
        "airbnb-engineering",
        "a[href*='airbnb-engineering']",
    )
}

fn tinder() -> SourceSpec {
    medium_publication("Tinder Tech Blog", "tinder", "a[href*='tinder']")
}

fn stripe() -> SourceSpec {
    SourceSpec {
        name: "Stripe Blog".to_string(),
        base_url: "https://stripe.com".to_string(),
        pagination: PaginationStyle::NumberedPages {
            page_url: "https://stripe.com/blog/page/{page}".to_string(),
            first_page_url: None,
            max_pages: 10,
        },
        selectors: summarized(
            dated(
                selectors(
                    "article.BlogIndexPost",
                    ".BlogIndexPost__title a",
                    ".BlogIndexPost__title a",
                ),
                "time",
                Some("datetime"),
            ),
            ".BlogIndexPost__body p",
        ),
        tags: TagRule::None,
    }
}

fn uber() -> SourceSpec {
    SourceSpec {
        name: "Uber Engineering Blog".to_string(),
        base_url: "https://www.uber.com".to_string(),
        pagination: PaginationStyle::NumberedPages {
            page_url: "https://www.uber.com/en-CA/blog/engineering/page/{page}/".to_string(),
            first_page_url: None,
            max_pages: 2,
        },
        // Date text reads like "May 6, 2025 / Global".
        selectors: dated(
            selectors("div[data-baseweb='flex-grid-item']", "h2", "a[href]"),
            "p",
            None,
        ),
        tags: TagRule::None,
    }
}

fn slack() -> SourceSpec {
    SourceSpec {
        name: "Slack Engineering Blog".to_string(),
        base_url: "https://slack.engineering".to_string(),
        pagination: PaginationStyle::NumberedPages {
            page_url: "https://slack.engineering/articles/page/{page}/".to_string(),
            first_page_url: Some("https://slack.engineering/articles/".to_string()),
            max_pages: 23,
        },
        selectors: summarized(
            dated(
                selectors(
                    "div.ts-posts-area__main article.ts-entry",
                    "h2.ts-entry__title a",
                    "h2.ts-entry__title a",
                ),
                "div.ts-meta-date",
                None,
            ),
            "p.ts-entry__excerpt",
        ),
        tags: TagRule::ClassPrefix {
            prefix: "tag-".to_string(),
        },
    }
}

fn notion() -> SourceSpec {
    SourceSpec {
        name: "Notion Blog".to_string(),
        base_url: "https://www.notion.so".to_string(),
        pagination: PaginationStyle::NumberedPages {
            page_url: "https://www.notion.so/blog/page/{page}".to_string(),
            first_page_url: None,
            max_pages: 10,
        },
        selectors: summarized(
            selectors("article.post-preview", "h3 a span", "h3 a"),
            "a.postPreview_subtitle__9cBhQ span",
        ),
        tags: tag_selector("div.postPreview_eyebrow__uXR9L span"),
    }
}

fn robinhood() -> SourceSpec {
    SourceSpec {
        name: "Robinhood Newsroom".to_string(),
        base_url: "https://newsroom.aboutrobinhood.com".to_string(),
        pagination: PaginationStyle::NumberedPages {
            page_url: "https://newsroom.aboutrobinhood.com/page/{page}/".to_string(),
            first_page_url: None,
            max_pages: 40,
        },
        selectors: summarized(
            dated(
                selectors(
                    "div.frontpage-post-box",
                    "div.frontpage-post-title h2",
                    "div.frontpage-post-title a",
                ),
                "time.entry-date",
                Some("datetime"),
            ),
            "div.frontpage-post-excerpt p",
        ),
        tags: tag_selector("div.frontpage-post-category span.post-category"),
    }
}

fn doordash() -> SourceSpec {
    SourceSpec {
        name: "DoorDash Engineering Blog".to_string(),
        base_url: "https://careersatdoordash.com".to_string(),
        pagination: PaginationStyle::ClickToLoad {
            seed_url: "https://careersatdoordash.com/engineering-blog/".to_string(),
            control: "#load-more".to_string(),
            max_clicks: 30,
        },
        selectors: selectors("div.fade.h-full", "p.with-tags", "a"),
        tags: tag_selector("div.flex.items-center.flex-wrap div.bg-gray"),
    }
}

fn meta() -> SourceSpec {
    SourceSpec {
        name: "Meta Engineering Blog".to_string(),
        base_url: "https://engineering.fb.com".to_string(),
        pagination: PaginationStyle::ClickToLoad {
            seed_url: "https://engineering.fb.com/".to_string(),
            control: "button.loadmore-btn".to_string(),
            max_clicks: 30,
        },
        selectors: dated(
            selectors("article.post", ".entry-title a", ".entry-title a"),
            "time.entry-date.published",
            Some("datetime"),
        ),
        tags: tag_selector("span.cat-links a.category"),
    }
}

/// One resolved registry entry.
#[derive(Clone)]
pub struct SourceEntry {
    pub adapter: Arc<dyn SourceAdapter>,
    pub enabled: bool,
    pub builtin: bool,
}

/// Source adapters resolved once at startup, in declaration order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    entries: Vec<SourceEntry>,
}

impl SourceRegistry {
    /// An empty registry. Use [`register`](Self::register) to add adapters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in sources with `[sources.<key>]` overrides applied, followed
    /// by custom sources in key order.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut registry = Self::new();
        let allow = config.scrape.enabled.as_ref();

        for (key, constructor) in BUILTIN_SOURCES {
            let over = config.sources.get(*key);
            let mut spec = match over.and_then(|o| o.spec.clone()) {
                Some(custom) => custom,
                None => constructor(),
            };
            if let Some(ceiling) = over.and_then(|o| o.ceiling) {
                spec.pagination.set_ceiling(ceiling);
            }
            let enabled = over.and_then(|o| o.enabled).unwrap_or(true)
                && allow.map_or(true, |keys| keys.iter().any(|k| k.as_str() == *key));

            registry.entries.push(SourceEntry {
                adapter: Arc::new(SelectorAdapter::new(*key, spec)?),
                enabled,
                builtin: true,
            });
        }

        for (key, over) in &config.sources {
            if registry.contains(key) {
                continue;
            }
            let Some(mut spec) = over.spec.clone() else {
                bail!(
                    "sources.{} is not a built-in source and has no spec table",
                    key
                );
            };
            if let Some(ceiling) = over.ceiling {
                spec.pagination.set_ceiling(ceiling);
            }
            let enabled = over.enabled.unwrap_or(true)
                && allow.map_or(true, |keys| keys.iter().any(|k| k == key));

            registry.entries.push(SourceEntry {
                adapter: Arc::new(SelectorAdapter::new(key.clone(), spec)?),
                enabled,
                builtin: false,
            });
        }

        Ok(registry)
    }

    /// Add an adapter (enabled). Replaces an existing entry with the same key.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        let entry = SourceEntry {
            adapter,
            enabled: true,
            builtin: false,
        };
        match self
            .entries
            .iter_mut()
            .find(|e| e.adapter.key() == entry.adapter.key())
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|e| e.adapter.key() == key)
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.entries
            .iter()
            .find(|e| e.adapter.key() == key)
            .map(|e| Arc::clone(&e.adapter))
    }

    pub fn entries(&self) -> &[SourceEntry] {
        &self.entries
    }

    /// Enabled adapters in registry order.
    pub fn enabled(&self) -> Vec<Arc<dyn SourceAdapter>> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| Arc::clone(&e.adapter))
            .collect()
    }

    pub fn keys(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.adapter.key()).collect()
    }
}

/// `harvest sources`: print the resolved registry.
pub fn list_sources(config: &Config) -> Result<()> {
    let registry = SourceRegistry::from_config(config)?;

    println!(
        "{:<12} {:<28} {:<16} {:>7}  {}",
        "KEY", "SOURCE", "PAGINATION", "CEILING", "ENABLED"
    );
    for entry in registry.entries() {
        let adapter = &entry.adapter;
        println!(
            "{:<12} {:<28} {:<16} {:>7}  {}",
            adapter.key(),
            adapter.source_name(),
            adapter.pagination().kind(),
            adapter.pagination().ceiling(),
            entry.enabled
        );
    }

    Ok(())
}
