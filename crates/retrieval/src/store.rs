//! File-based index persistence.
//!
//! Each corpus is one JSON document at `<dir>/<corpus_id>.json` holding
//! the embedder fingerprint, the digest of the documents and splitter
//! settings it was built from, and every chunk with its vector. An index
//! built by a different embedder is never loaded.
//!
//! Storage location: `~/.careplan/index/` unless configured otherwise.

use std::path::{Path, PathBuf};

use careplan_core::RetrievalError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::corpus::{Corpus, IndexedChunk};
use crate::embedder::EmbedderFingerprint;

/// On-disk layout of one persisted corpus.
#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    corpus_id: String,
    fingerprint: EmbedderFingerprint,
    #[serde(default)]
    source_digest: String,
    created_at: DateTime<Utc>,
    chunks: Vec<IndexedChunk>,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    dir: PathBuf,
}

impl IndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, corpus_id: &str) -> PathBuf {
        self.dir.join(format!("{corpus_id}.json"))
    }

    /// Write a corpus to disk, replacing any previous index for the same id.
    pub fn save(&self, corpus: &Corpus) -> Result<PathBuf, RetrievalError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| RetrievalError::Storage(format!("Failed to create index directory: {e}")))?;

        let file = IndexFile {
            corpus_id: corpus.id.clone(),
            fingerprint: corpus.fingerprint.clone(),
            source_digest: corpus.source_digest.clone(),
            created_at: Utc::now(),
            chunks: corpus.chunks.clone(),
        };
        let json = serde_json::to_string(&file)
            .map_err(|e| RetrievalError::Storage(format!("Failed to serialize index: {e}")))?;

        let path = self.path_for(&corpus.id);
        std::fs::write(&path, json)
            .map_err(|e| RetrievalError::Storage(format!("Failed to write index file: {e}")))?;

        debug!(corpus = %corpus.id, path = %path.display(), chunks = corpus.len(), "Index saved");
        Ok(path)
    }

    /// Load a corpus if a compatible index exists.
    ///
    /// Returns `Ok(None)` when the file is missing, unreadable as an
    /// index, or was built by a different embedder.
    pub fn load(
        &self,
        corpus_id: &str,
        expected: &EmbedderFingerprint,
    ) -> Result<Option<Corpus>, RetrievalError> {
        let path = self.path_for(corpus_id);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RetrievalError::Storage(format!(
                    "Failed to read index file {}: {e}",
                    path.display()
                )));
            }
        };

        let file: IndexFile = match serde_json::from_str(&content) {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring corrupted index file");
                return Ok(None);
            }
        };

        if &file.fingerprint != expected {
            warn!(
                corpus = corpus_id,
                found = %file.fingerprint,
                expected = %expected,
                "Index was built by a different embedder"
            );
            return Ok(None);
        }

        debug!(corpus = corpus_id, chunks = file.chunks.len(), "Index loaded");
        Ok(Some(Corpus {
            id: file.corpus_id,
            fingerprint: file.fingerprint,
            source_digest: file.source_digest,
            chunks: file.chunks,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::SourceDocument;
    use crate::embedder::{Embedder, HashingEmbedder};
    use crate::splitter::TextSplitter;

    async fn sample_corpus(embedder: &HashingEmbedder) -> Corpus {
        let mut corpus = Corpus::new("medical_knowledge", embedder.fingerprint());
        corpus
            .extend(
                &[SourceDocument::new("d1", "Drug Database", "Orlistat 120mg three times daily.")],
                &TextSplitter::default(),
                embedder,
            )
            .await
            .unwrap();
        corpus
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let embedder = HashingEmbedder::new(32);
        let corpus = sample_corpus(&embedder).await;

        let path = store.save(&corpus).unwrap();
        assert!(path.ends_with("medical_knowledge.json"));

        let loaded = store
            .load("medical_knowledge", &embedder.fingerprint())
            .unwrap()
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.chunks[0].chunk.source, "Drug Database");
        assert_eq!(loaded.chunks[0].embedding, corpus.chunks[0].embedding);
        assert_eq!(loaded.source_digest, corpus.source_digest);
    }

    #[test]
    fn missing_index_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let loaded = store
            .load("patient_data", &HashingEmbedder::default().fingerprint())
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn fingerprint_mismatch_is_not_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        let corpus = sample_corpus(&HashingEmbedder::new(32)).await;
        store.save(&corpus).unwrap();

        let other = HashingEmbedder::new(64).fingerprint();
        assert!(store.load("medical_knowledge", &other).unwrap().is_none());
    }

    #[test]
    fn corrupted_index_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::new(dir.path());
        std::fs::write(store.path_for("medical_knowledge"), "{not json").unwrap();
        let loaded = store
            .load("medical_knowledge", &HashingEmbedder::default().fingerprint())
            .unwrap();
        assert!(loaded.is_none());
    }
}
