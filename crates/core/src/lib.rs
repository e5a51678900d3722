//! # CarePlan Core
//!
//! Domain types, traits, and error definitions for the CarePlan
//! treatment-planning pipeline. This crate has **no framework
//! dependencies**: it defines the domain model that every other crate
//! implements against.
//!
//! ## Design Philosophy
//!
//! External collaborators (LLM inference, embeddings) are defined as
//! traits here. Implementations live in their respective crates, which
//! keeps the pipeline testable with scripted fakes and keeps the
//! dependency graph pointing inward.

pub mod error;
pub mod event;
pub mod message;
pub mod patient;
pub mod provider;
pub mod stage;

// Re-export key types at crate root for ergonomics
pub use error::{
    Error, PatientDataError, PromptError, ProviderError, Result, RetrievalError, StageExecutionError,
    StageFailure,
};
pub use event::{EventBus, PipelineEvent};
pub use message::{Message, Role};
pub use patient::{
    BmiAssessment, BmiCategory, Gender, PatientAttributes, PatientRecord, ResidenceType, WealthTier,
};
pub use provider::{EmbeddingRequest, EmbeddingResponse, Provider, ProviderRequest, ProviderResponse, Usage};
pub use stage::{Stage, StageOutput};
