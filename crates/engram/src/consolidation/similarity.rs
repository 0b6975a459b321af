//! Pluggable similarity scoring
//!
//! Consolidation clustering and retrieval text-relevance both go through
//! the `Similarity` trait. The lexical token-overlap scorer is always
//! available and needs no external model; the vector-embedding scorer is
//! compiled behind the `embeddings` feature and selected only through
//! configuration.

use std::collections::HashSet;

use crate::config::SimilarityConfig;
use crate::error::{EngramError, Result};

/// A symmetric text-similarity score in [0, 1].
pub trait Similarity: Send + Sync {
    fn score(&self, a: &str, b: &str) -> f32;

    /// Backend name for logs and diagnostics.
    fn name(&self) -> &'static str;
}

/// Build the configured similarity backend.
pub fn from_config(config: &SimilarityConfig) -> Result<Box<dyn Similarity>> {
    match config.provider.as_str() {
        "lexical" => Ok(Box::new(LexicalSimilarity)),
        #[cfg(feature = "embeddings")]
        "embedding" => Ok(Box::new(EmbeddingSimilarity::new()?)),
        #[cfg(not(feature = "embeddings"))]
        "embedding" => Err(EngramError::Config(
            "Similarity provider 'embedding' requires the 'embeddings' feature".to_string(),
        )),
        other => Err(EngramError::Config(format!(
            "Unknown similarity provider: {other}. Use lexical or embedding."
        ))),
    }
}

/// Dependency-free Jaccard overlap over lowercased word tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalSimilarity;

impl Similarity for LexicalSimilarity {
    fn score(&self, a: &str, b: &str) -> f32 {
        let set_a = tokenize(a);
        let set_b = tokenize(b);
        if set_a.is_empty() || set_b.is_empty() {
            return 0.0;
        }
        let intersection = set_a.intersection(&set_b).count() as f32;
        let union = set_a.union(&set_b).count() as f32;
        intersection / union
    }

    fn name(&self) -> &'static str {
        "lexical"
    }
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Vector-embedding similarity backed by fastembed. Optional enhancement;
/// never required for correctness.
#[cfg(feature = "embeddings")]
pub struct EmbeddingSimilarity {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
}

#[cfg(feature = "embeddings")]
impl EmbeddingSimilarity {
    pub fn new() -> Result<Self> {
        let model = fastembed::TextEmbedding::try_new(fastembed::InitOptions::new(
            fastembed::EmbeddingModel::AllMiniLML6V2,
        ))
        .map_err(|e| EngramError::Config(format!("Failed to load embedding model: {e}")))?;
        Ok(Self {
            model: std::sync::Mutex::new(model),
        })
    }
}

#[cfg(feature = "embeddings")]
impl Similarity for EmbeddingSimilarity {
    fn score(&self, a: &str, b: &str) -> f32 {
        let mut model = match self.model.lock() {
            Ok(model) => model,
            Err(_) => return 0.0,
        };
        let embeddings = match model.embed(vec![a, b], None) {
            Ok(embeddings) => embeddings,
            Err(e) => {
                tracing::warn!("Embedding failed, scoring 0: {e}");
                return 0.0;
            }
        };
        cosine_similarity(&embeddings[0], &embeddings[1]).max(0.0)
    }

    fn name(&self) -> &'static str {
        "embedding"
    }
}

#[cfg(feature = "embeddings")]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}
