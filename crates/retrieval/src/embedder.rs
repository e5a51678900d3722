//! Embedders turn text into fixed-size vectors.
//!
//! A corpus must be queried with the same embedder that built it; the
//! [`Embedder::fingerprint`] is persisted alongside every index so a
//! mismatch is detected on load.

use std::sync::Arc;

use async_trait::async_trait;
use careplan_core::{EmbeddingRequest, Provider, RetrievalError};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::vector::l2_normalize;

/// Produces fixed-size float vectors from text.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short stable identifier, part of the fingerprint.
    fn name(&self) -> &str;

    /// Vector dimension returned by [`Embedder::embed`].
    fn dimension(&self) -> usize;

    /// Embeds each text. Returns one vector per input text in the same order.
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError>;

    fn fingerprint(&self) -> EmbedderFingerprint {
        EmbedderFingerprint {
            embedder: self.name().to_string(),
            dimension: self.dimension(),
        }
    }
}

/// Identity of the embedder that produced a persisted index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EmbedderFingerprint {
    pub embedder: String,
    pub dimension: usize,
}

impl std::fmt::Display for EmbedderFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.embedder, self.dimension)
    }
}

/// Local, deterministic feature-hashing embedder.
///
/// Lower-cased word tokens (weight 1.0) and adjacent word bigrams
/// (weight 0.5) are hashed with SHA-256 into `dimension` signed buckets,
/// then the vector is L2-normalised. Texts sharing vocabulary land close
/// together, which is all the bundled corpora need.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub const DEFAULT_DIMENSION: usize = 384;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        for token in &tokens {
            self.add_feature(&mut v, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        l2_normalize(&mut v);
        v
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// Embeds through an LLM provider's embedding endpoint.
pub struct ProviderEmbedder {
    provider: Arc<dyn Provider>,
    model: String,
    dimension: usize,
    name: String,
}

impl ProviderEmbedder {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, dimension: usize) -> Self {
        let model = model.into();
        let name = format!("{}:{}", provider.name(), model);
        Self {
            provider,
            model,
            dimension,
            name,
        }
    }
}

#[async_trait]
impl Embedder for ProviderEmbedder {
    fn name(&self) -> &str {
        &self.name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs: texts.iter().map(|t| t.to_string()).collect(),
            })
            .await
            .map_err(|e| RetrievalError::Embedding(e.to_string()))?;

        if response.embeddings.len() != texts.len() {
            return Err(RetrievalError::Embedding(format!(
                "expected {} vectors, provider returned {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        if let Some(bad) = response.embeddings.iter().find(|v| v.len() != self.dimension) {
            return Err(RetrievalError::Embedding(format!(
                "expected dimension {}, provider returned {}",
                self.dimension,
                bad.len()
            )));
        }

        debug!(embedder = %self.name, count = texts.len(), "Embedded batch");
        Ok(response.embeddings)
    }
}
