//! Configuration parsing and validation.
//!
//! Blog Harvest is configured via a TOML file (default: `config/harvest.toml`).
//! Every section except `[db]` is optional and falls back to defaults.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/harvest.sqlite"
//!
//! [embedding]
//! provider = "local"
//! model = "bge-base-en-v1.5"
//! dims = 768
//!
//! [scrape]
//! driver = "http"
//! pacing_ms = 2000
//! parallelism = 2
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 500
//!
//! [sources.uber]
//! ceiling = 5
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::source::SourceSpec;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-source overrides and custom sources, keyed by registry key.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceOverride>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: default_dims(),
            batch_size: default_batch_size(),
            max_retries: default_embed_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_dims() -> usize {
    768
}
fn default_batch_size() -> usize {
    64
}
fn default_embed_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_top_n_tags")]
    pub top_n_tags: usize,
    #[serde(default = "default_category")]
    pub default_category: String,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            top_n_tags: default_top_n_tags(),
            default_category: default_category(),
        }
    }
}

fn default_top_n_tags() -> usize {
    5
}
fn default_category() -> String {
    blog_harvest_core::models::DEFAULT_CATEGORY.to_string()
}

/// One taxonomy entry: a category name and the phrases that describe it.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CategoryConfig {
    pub name: String,
    pub examples: Vec<String>,
}

/// Ordered category taxonomy. Declaration order is the tie-break order.
#[derive(Debug, Deserialize, Clone)]
pub struct TaxonomyConfig {
    #[serde(default = "default_taxonomy_version")]
    pub version: String,
    #[serde(default = "builtin_categories")]
    pub categories: Vec<CategoryConfig>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            version: default_taxonomy_version(),
            categories: builtin_categories(),
        }
    }
}

fn default_taxonomy_version() -> String {
    "2024.1".to_string()
}

fn category(name: &str, examples: &[&str]) -> CategoryConfig {
    CategoryConfig {
        name: name.to_string(),
        examples: examples.iter().map(|e| e.to_string()).collect(),
    }
}

/// The six built-in engineering categories.
pub fn builtin_categories() -> Vec<CategoryConfig> {
    vec![
        category(
            "Frontend",
            &[
                "Responsive UI design",
                "JavaScript and CSS",
                "React components",
                "user interface engineering",
            ],
        ),
        category(
            "Backend",
            &[
                "API development",
                "server-side logic",
                "database design",
                "backend scalability",
            ],
        ),
        category(
            "Infrastructure",
            &[
                "DevOps practices",
                "Kubernetes",
                "CI/CD pipelines",
                "monitoring systems",
            ],
        ),
        category(
            "Machine Learning",
            &[
                "ML pipelines",
                "deep learning",
                "recommendation systems",
                "NLP",
            ],
        ),
        category(
            "Security",
            &[
                "application security",
                "OAuth",
                "encryption",
                "threat detection",
            ],
        ),
        category(
            "Cloud",
            &[
                "AWS Lambda",
                "serverless architecture",
                "cloud computing",
                "Azure integration",
            ],
        ),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    /// Page-session driver: `http` (static HTML) or `chrome` (headless browser).
    #[serde(default = "default_driver")]
    pub driver: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Delay between pagination actions, in milliseconds.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Wall-clock deadline for one whole source run.
    #[serde(default = "default_source_timeout_secs")]
    pub source_timeout_secs: u64,
    /// Number of sources scraped concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Optional allow-list of source keys for `scrape all`.
    #[serde(default)]
    pub enabled: Option<Vec<String>>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            user_agent: default_user_agent(),
            pacing_ms: default_pacing_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            source_timeout_secs: default_source_timeout_secs(),
            parallelism: default_parallelism(),
            enabled: None,
        }
    }
}

fn default_driver() -> String {
    "http".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}
fn default_pacing_ms() -> u64 {
    2000
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_source_timeout_secs() -> u64 {
    900
}
fn default_parallelism() -> usize {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `compact` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_format() -> String {
    "compact".to_string()
}

/// `[sources.<key>]` table.
///
/// For a built-in key, `enabled` and `ceiling` adjust the registered
/// source. A `spec` table defines a new source (or replaces a built-in)
/// with the same extraction-strategy value the built-ins use.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourceOverride {
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Replaces the pagination ceiling (scrolls, pages, or clicks).
    #[serde(default)]
    pub ceiling: Option<u32>,
    #[serde(default)]
    pub spec: Option<SourceSpec>,
}

impl Config {
    /// In-code configuration with every default applied.
    ///
    /// Used by tests and by commands that can run without a config file.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            embedding: EmbeddingConfig::default(),
            enrichment: EnrichmentConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            scrape: ScrapeConfig::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            sources: BTreeMap::new(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Embedding
    if config.embedding.is_enabled() && config.embedding.dims == 0 {
        bail!(
            "embedding.dims must be > 0 when provider is '{}'",
            config.embedding.provider
        );
    }
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
            other
        ),
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Enrichment
    if config.enrichment.top_n_tags == 0 {
        bail!("enrichment.top_n_tags must be > 0");
    }

    // Taxonomy
    if config.taxonomy.categories.is_empty() {
        bail!("taxonomy.categories must declare at least one category");
    }
    let mut seen = HashSet::new();
    for cat in &config.taxonomy.categories {
        if cat.name.trim().is_empty() {
            bail!("taxonomy category names must be non-empty");
        }
        if !seen.insert(cat.name.as_str()) {
            bail!("duplicate taxonomy category: '{}'", cat.name);
        }
        if cat.examples.is_empty() {
            bail!("taxonomy category '{}' has no examples", cat.name);
        }
    }

    // Scrape
    match config.scrape.driver.as_str() {
        "http" | "chrome" => {}
        other => bail!("Unknown scrape driver: '{}'. Must be http or chrome.", other),
    }
    if config.scrape.parallelism == 0 {
        bail!("scrape.parallelism must be >= 1");
    }
    if config.scrape.source_timeout_secs == 0 {
        bail!("scrape.source_timeout_secs must be > 0");
    }

    // Logging
    match config.logging.format.as_str() {
        "compact" | "json" => {}
        other => bail!("Unknown logging format: '{}'. Must be compact or json.", other),
    }

    // Sources
    for (key, over) in &config.sources {
        if over.ceiling == Some(0) {
            bail!("sources.{}.ceiling must be >= 1", key);
        }
        if let Some(spec) = &over.spec {
            if spec.pagination.ceiling() == 0 {
                bail!("sources.{}.spec.pagination ceiling must be >= 1", key);
            }
        }
    }

    Ok(())
}
