//! Corpora: named collections of embedded knowledge chunks.

use std::collections::BTreeMap;

use careplan_core::RetrievalError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::embedder::{Embedder, EmbedderFingerprint};
use crate::splitter::TextSplitter;
use crate::vector::top_k;

/// Corpus of medical guideline snippets.
pub const MEDICAL_KNOWLEDGE: &str = "medical_knowledge";
/// Corpus of historical patient profiles.
pub const PATIENT_DATA: &str = "patient_data";

/// Texts sent to the embedder per call while building.
const EMBED_BATCH: usize = 64;

/// A document before splitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: String,
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SourceDocument {
    pub fn new(id: impl Into<String>, source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }
}

/// One window of a split document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub document_id: String,
    pub chunk_index: usize,
    pub source: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl KnowledgeChunk {
    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: KnowledgeChunk,
    pub embedding: Vec<f32>,
}

/// A chunk and its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Hits for one query, most similar first.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub corpus: String,
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty(corpus: impl Into<String>) -> Self {
        Self {
            corpus: corpus.into(),
            hits: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// Hex SHA-256 over `previous`, the splitter settings and every document
/// (id, source, content, metadata), in order.
///
/// Two corpora share a digest only when they were split and embedded
/// from the same inputs, so a persisted index can be checked against the
/// documents it would be rebuilt from.
pub fn source_digest(previous: &str, documents: &[SourceDocument], splitter: &TextSplitter) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous.as_bytes());
    hasher.update(splitter.chunk_size().to_le_bytes());
    hasher.update(splitter.chunk_overlap().to_le_bytes());
    for separator in splitter.separators() {
        hasher.update((separator.len() as u64).to_le_bytes());
        hasher.update(separator.as_bytes());
    }
    for doc in documents {
        let fields = [doc.id.as_str(), doc.source.as_str(), doc.content.as_str()]
            .into_iter()
            .chain(doc.metadata.iter().flat_map(|(k, v)| [k.as_str(), v.as_str()]));
        for field in fields {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        // document boundary
        hasher.update([0xff]);
    }
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// An embedded corpus, searchable by cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub id: String,
    pub fingerprint: EmbedderFingerprint,
    /// Chained [`source_digest`] of every batch passed to [`Corpus::extend`].
    #[serde(default)]
    pub source_digest: String,
    pub chunks: Vec<IndexedChunk>,
}

impl Corpus {
    pub fn new(id: impl Into<String>, fingerprint: EmbedderFingerprint) -> Self {
        Self {
            id: id.into(),
            fingerprint,
            source_digest: String::new(),
            chunks: Vec::new(),
        }
    }

    /// Split, embed and append documents. Returns the number of chunks added.
    pub async fn extend(
        &mut self,
        documents: &[SourceDocument],
        splitter: &TextSplitter,
        embedder: &dyn Embedder,
    ) -> Result<usize, RetrievalError> {
        let chunks: Vec<KnowledgeChunk> = documents
            .iter()
            .flat_map(|doc| {
                splitter
                    .split(&doc.content)
                    .into_iter()
                    .enumerate()
                    .map(|(chunk_index, content)| KnowledgeChunk {
                        document_id: doc.id.clone(),
                        chunk_index,
                        source: doc.source.clone(),
                        content,
                        metadata: doc.metadata.clone(),
                    })
            })
            .collect();

        let mut added = 0;
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let embeddings = embedder.embed(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(RetrievalError::Embedding(format!(
                    "expected {} vectors, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }
            for (chunk, embedding) in batch.iter().cloned().zip(embeddings) {
                self.chunks.push(IndexedChunk { chunk, embedding });
                added += 1;
            }
        }

        self.source_digest = source_digest(&self.source_digest, documents, splitter);
        debug!(
            corpus = %self.id,
            documents = documents.len(),
            chunks = added,
            "Corpus extended"
        );
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k chunks for a query vector.
    pub fn search(&self, query_embedding: &[f32], k: usize) -> RetrievalResult {
        let hits = top_k(
            self.chunks.iter().map(|c| c.embedding.as_slice()),
            query_embedding,
            k,
        )
        .into_iter()
        .map(|(i, score)| ScoredChunk {
            chunk: self.chunks[i].chunk.clone(),
            score,
        })
        .collect();

        RetrievalResult {
            corpus: self.id.clone(),
            hits,
        }
    }
}
