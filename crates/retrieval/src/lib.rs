//! Retrieval-augmented context for CarePlan.
//!
//! Documents are split into overlapping windows, embedded, and stored as
//! named corpora (`medical_knowledge`, `patient_data`). The
//! [`ContextRetriever`] answers top-k cosine-similarity queries and the
//! [`context`] module renders hits into prompt-ready text.

pub mod context;
pub mod corpus;
pub mod embedder;
pub mod knowledge;
pub mod retriever;
pub mod splitter;
pub mod store;
pub mod vector;

pub use context::{NO_MEDICAL_CONTEXT, NO_PATIENT_CONTEXT, format_medical_context, format_patient_context};
pub use corpus::{
    Corpus, KnowledgeChunk, MEDICAL_KNOWLEDGE, PATIENT_DATA, RetrievalResult, ScoredChunk, SourceDocument,
};
pub use embedder::{Embedder, EmbedderFingerprint, HashingEmbedder, ProviderEmbedder};
pub use knowledge::medical_documents;
pub use retriever::ContextRetriever;
pub use splitter::TextSplitter;
pub use store::IndexStore;
