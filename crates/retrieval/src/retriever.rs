//! Context retriever: top-k lookup over named corpora.
//!
//! Corpora are built (or loaded) while the retriever is still owned
//! mutably. Once wrapped in an `Arc` for the pipeline it is read-only,
//! so concurrent runs need no locking.

use std::collections::HashMap;
use std::sync::Arc;

use careplan_core::RetrievalError;
use tracing::{debug, info};

use crate::corpus::{Corpus, RetrievalResult, SourceDocument, source_digest};
use crate::embedder::Embedder;
use crate::splitter::TextSplitter;
use crate::store::IndexStore;

pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    store: Option<IndexStore>,
    corpora: HashMap<String, Corpus>,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, splitter: TextSplitter) -> Self {
        Self {
            embedder,
            splitter,
            store: None,
            corpora: HashMap::new(),
        }
    }

    /// Persist built corpora and load existing ones from `store`.
    pub fn with_store(mut self, store: IndexStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    /// (Re)build a corpus from scratch and persist it if a store is set.
    /// Returns the number of chunks.
    pub async fn build_corpus(
        &mut self,
        corpus_id: &str,
        documents: &[SourceDocument],
    ) -> Result<usize, RetrievalError> {
        let mut corpus = Corpus::new(corpus_id, self.embedder.fingerprint());
        corpus
            .extend(documents, &self.splitter, self.embedder.as_ref())
            .await?;
        let chunks = corpus.len();

        if let Some(store) = &self.store {
            store.save(&corpus)?;
        }

        info!(
            corpus = corpus_id,
            documents = documents.len(),
            chunks,
            embedder = %corpus.fingerprint,
            "Corpus built"
        );
        self.corpora.insert(corpus_id.to_string(), corpus);
        Ok(chunks)
    }

    /// Append documents to an existing corpus and persist the result.
    pub async fn add_documents(
        &mut self,
        corpus_id: &str,
        documents: &[SourceDocument],
    ) -> Result<usize, RetrievalError> {
        if !self.corpora.contains_key(corpus_id) && !self.load(corpus_id)? {
            return Err(RetrievalError::CorpusNotFound(corpus_id.to_string()));
        }
        let corpus = self
            .corpora
            .get_mut(corpus_id)
            .ok_or_else(|| RetrievalError::CorpusNotFound(corpus_id.to_string()))?;

        let added = corpus
            .extend(documents, &self.splitter, self.embedder.as_ref())
            .await?;

        if let Some(store) = &self.store {
            store.save(corpus)?;
        }
        Ok(added)
    }

    /// Load a persisted corpus. Returns whether a compatible index was found.
    pub fn load(&mut self, corpus_id: &str) -> Result<bool, RetrievalError> {
        let Some(store) = &self.store else {
            return Ok(false);
        };
        match store.load(corpus_id, &self.embedder.fingerprint())? {
            Some(corpus) => {
                info!(corpus = corpus_id, chunks = corpus.len(), "Loaded persisted corpus");
                self.corpora.insert(corpus_id.to_string(), corpus);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Load the persisted corpus, or build it from `documents` when no
    /// compatible index exists.
    ///
    /// A persisted index is reused only when it was built by the same
    /// embedder from the same documents and splitter settings.
    pub async fn load_or_build<F>(&mut self, corpus_id: &str, documents: F) -> Result<usize, RetrievalError>
    where
        F: FnOnce() -> Vec<SourceDocument>,
    {
        let docs = documents();
        let expected = source_digest("", &docs, &self.splitter);

        if let Some(store) = &self.store
            && let Some(corpus) = store.load(corpus_id, &self.embedder.fingerprint())?
        {
            if corpus.source_digest == expected {
                let chunks = corpus.len();
                info!(corpus = corpus_id, chunks, "Loaded persisted corpus");
                self.corpora.insert(corpus_id.to_string(), corpus);
                return Ok(chunks);
            }
            info!(
                corpus = corpus_id,
                documents = docs.len(),
                "Persisted corpus was built from different documents, rebuilding"
            );
        }
        self.build_corpus(corpus_id, &docs).await
    }

    pub fn has_corpus(&self, corpus_id: &str) -> bool {
        self.corpora.contains_key(corpus_id)
    }

    pub fn corpus_len(&self, corpus_id: &str) -> usize {
        self.corpora.get(corpus_id).map(Corpus::len).unwrap_or(0)
    }

    /// Top-k chunks of `corpus_id` most similar to `query`, best first.
    ///
    /// `k = 0` returns an empty result without embedding the query.
    pub async fn retrieve(
        &self,
        corpus_id: &str,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult, RetrievalError> {
        let corpus = self
            .corpora
            .get(corpus_id)
            .ok_or_else(|| RetrievalError::CorpusNotFound(corpus_id.to_string()))?;

        if k == 0 {
            return Ok(RetrievalResult::empty(corpus_id));
        }

        let query_embedding = self
            .embedder
            .embed(&[query])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RetrievalError::Embedding("embedder returned no vector for query".into()))?;

        let result = corpus.search(&query_embedding, k);
        debug!(
            corpus = corpus_id,
            k,
            hits = result.len(),
            top_score = result.hits.first().map(|h| h.score).unwrap_or(0.0),
            "Retrieved context"
        );
        Ok(result)
    }
}
