//! Export embedded articles as JSON.
//!
//! Produces the bulk read the search and recommendation layer consumes:
//! every stored article that carries an embedding, with its vector.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use blog_harvest_core::models::StoredArticle;
use blog_harvest_core::store::ArticleStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

#[derive(Serialize)]
struct ExportData<'a> {
    model_dims: usize,
    count: usize,
    articles: &'a [StoredArticle],
}

/// Serialize articles into the export document.
pub fn to_json(articles: &[StoredArticle], dims: usize) -> Result<String> {
    let data = ExportData {
        model_dims: dims,
        count: articles.len(),
        articles,
    };
    Ok(serde_json::to_string_pretty(&data)?)
}

/// Export embedded articles as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let store = SqliteStore::connect(config).await?;
    let articles = store.articles_with_embeddings().await?;
    let json = to_json(&articles, config.embedding.dims)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} articles to {}", articles.len(), path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    store.close().await;
    Ok(())
}
