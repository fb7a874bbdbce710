//! Embedding and classification service.
//!
//! [`ClassificationService`] wraps one [`EmbeddingProvider`] and one
//! category taxonomy. It is built once at startup by
//! [`ClassificationService::initialize`], which embeds every taxonomy
//! example phrase, and is then shared read-only (behind an `Arc`) by every
//! enricher.
//!
//! Classification is nearest-example: a text's category is the one whose
//! closest example phrase has the highest cosine similarity. Equal scores
//! resolve to the category declared first.

use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

use blog_harvest_core::embedding::{
    cosine_similarity, validate_embedding, EmbeddingError, EmbeddingProvider,
};

use crate::config::{Config, TaxonomyConfig};
use crate::embedding;
use crate::keyphrase;

/// Embedded example phrases for one taxonomy category.
#[derive(Debug, Clone)]
pub struct CategoryCentroid {
    pub name: String,
    pub examples: Vec<Vec<f32>>,
}

pub struct ClassificationService {
    provider: Arc<dyn EmbeddingProvider>,
    dims: usize,
    taxonomy_version: String,
    default_category: String,
    centroids: Vec<CategoryCentroid>,
}

impl ClassificationService {
    /// Embed every taxonomy example once and build the service.
    ///
    /// Examples whose vectors fail validation are left out of their
    /// category. If the model cannot embed the examples at all, the service
    /// still starts and every text classifies as `default_category`.
    pub async fn initialize(
        provider: Arc<dyn EmbeddingProvider>,
        taxonomy: &TaxonomyConfig,
        default_category: &str,
    ) -> Result<Self> {
        let dims = provider.dims();
        let phrases: Vec<String> = taxonomy
            .categories
            .iter()
            .flat_map(|c| c.examples.iter().cloned())
            .collect();

        let vectors = match provider.embed(&phrases).await {
            Ok(vectors) if vectors.len() == phrases.len() => Some(vectors),
            Ok(vectors) => {
                warn!(
                    expected = phrases.len(),
                    got = vectors.len(),
                    "Embedding model returned the wrong number of taxonomy vectors"
                );
                None
            }
            Err(e) => {
                warn!(error = %e, "Taxonomy examples could not be embedded; classification disabled");
                None
            }
        };

        let mut centroids = Vec::with_capacity(taxonomy.categories.len());
        if let Some(vectors) = vectors {
            let mut vectors = vectors.into_iter();
            for category in &taxonomy.categories {
                let examples: Vec<Vec<f32>> = vectors
                    .by_ref()
                    .take(category.examples.len())
                    .filter(|v| validate_embedding(v, dims).is_ok())
                    .collect();
                if examples.len() < category.examples.len() {
                    warn!(
                        category = %category.name,
                        dropped = category.examples.len() - examples.len(),
                        "Discarded invalid example vectors"
                    );
                }
                centroids.push(CategoryCentroid {
                    name: category.name.clone(),
                    examples,
                });
            }
        }

        info!(
            model = provider.model_name(),
            dims,
            taxonomy = %taxonomy.version,
            categories = centroids.len(),
            "Classification service ready"
        );

        Ok(Self {
            provider,
            dims,
            taxonomy_version: taxonomy.version.clone(),
            default_category: default_category.to_string(),
            centroids,
        })
    }

    pub fn model_name(&self) -> &str {
        self.provider.model_name()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn taxonomy_version(&self) -> &str {
        &self.taxonomy_version
    }

    pub fn default_category(&self) -> &str {
        &self.default_category
    }

    pub fn centroids(&self) -> &[CategoryCentroid] {
        &self.centroids
    }

    /// Embed one text into a validated vector.
    ///
    /// Any model error, wrong length, non-finite component, or all-zero
    /// vector is an error; there is no placeholder vector.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Model("empty embedding response".to_string()))
    }

    /// Embed several texts in one model call, validating every vector.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = self
            .provider
            .embed(texts)
            .await
            .map_err(|e| EmbeddingError::Model(e.to_string()))?;

        if vectors.len() != texts.len() {
            return Err(EmbeddingError::Model(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        for v in &vectors {
            validate_embedding(v, self.dims)?;
        }
        Ok(vectors)
    }

    /// Category for an already-embedded text.
    ///
    /// Scores each category by its best-matching example; a later category
    /// must score strictly higher to displace an earlier one.
    pub fn classify_vector(&self, vector: &[f32]) -> String {
        let mut best: Option<(&str, f32)> = None;

        for centroid in &self.centroids {
            let score = centroid
                .examples
                .iter()
                .map(|example| cosine_similarity(vector, example))
                .fold(f32::NEG_INFINITY, f32::max);
            if !score.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((&centroid.name, score));
            }
        }

        best.map(|(name, _)| name.to_string())
            .unwrap_or_else(|| self.default_category.clone())
    }

    /// Category for a title and optional summary.
    ///
    /// Embeds `"{title}. {summary}"`; falls back to the default category
    /// when the embedding fails.
    pub async fn classify(&self, title: &str, summary: Option<&str>) -> String {
        if self.centroids.is_empty() {
            return self.default_category.clone();
        }
        let text = format!("{}. {}", title, summary.unwrap_or(""));
        match self.embed(&text).await {
            Ok(vector) => self.classify_vector(&vector),
            Err(e) => {
                debug!(error = %e, title, "Classification embedding failed");
                self.default_category.clone()
            }
        }
    }

    /// Top `top_n` keyphrases of `text`, most relevant first.
    ///
    /// Ranks candidates by similarity to the whole text using one batched
    /// embedding call; falls back to frequency ranking when embedding fails.
    pub async fn extract_tags(&self, text: &str, top_n: usize) -> Vec<String> {
        let candidates = keyphrase::candidates(text);
        if candidates.is_empty() || top_n == 0 {
            return Vec::new();
        }

        let mut batch = Vec::with_capacity(candidates.len() + 1);
        batch.push(text.to_string());
        batch.extend(candidates.iter().map(|c| c.phrase.clone()));

        match self.embed_batch(&batch).await {
            Ok(mut vectors) => {
                let document = vectors.remove(0);
                keyphrase::rank_by_similarity(&candidates, &document, &vectors, top_n)
            }
            Err(e) => {
                debug!(error = %e, "Keyphrase embedding failed, ranking by frequency");
                keyphrase::rank_by_frequency(&candidates, top_n)
            }
        }
    }
}

/// `harvest classify`: print the category and tags a post would receive.
pub async fn run_classify(config: &Config, title: &str, summary: Option<&str>) -> Result<()> {
    if !config.embedding.is_enabled() {
        anyhow::bail!(
            "Classification requires an embedding provider. Set [embedding] provider in your config."
        );
    }
    let provider = embedding::create_provider(&config.embedding).await?;
    let service = ClassificationService::initialize(
        provider,
        &config.taxonomy,
        &config.enrichment.default_category,
    )
    .await?;

    let tag_text = match summary {
        Some(summary) if !summary.trim().is_empty() => format!("{title}. {summary}"),
        _ => title.to_string(),
    };
    let category = service.classify(title, summary).await;
    let tags = service
        .extract_tags(&tag_text, config.enrichment.top_n_tags)
        .await;

    println!("title:    {}", title);
    println!("category: {}", category);
    println!("tags:     {}", tags.join(", "));
    println!(
        "model:    {} ({} dims, taxonomy {})",
        service.model_name(),
        service.dims(),
        service.taxonomy_version()
    );
    Ok(())
}
