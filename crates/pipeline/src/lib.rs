//! # CarePlan Pipeline
//!
//! Turns one [`PatientRecord`](careplan_core::PatientRecord) into a
//! coordinated obesity treatment plan through five LLM stages:
//!
//! 1. **Analysis**: risk assessment grounded in similar patient records
//! 2. **Diet planning**, **medical evaluation** and **fitness planning**:
//!    independent specialist plans, each grounded in medical guidance
//! 3. **Coordination**: merges the four upstream outputs into the report
//!
//! [`CareContext`] loads the dataset, corpora and provider once and hands
//! them to a [`TreatmentPipeline`].

pub mod context;
pub mod grounding;
pub mod input;
pub mod pipeline;
pub mod prompt;
pub mod report;
pub mod roles;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use context::{CareContext, build_embedder, load_dataset, prepare_retriever};
pub use grounding::Grounding;
pub use input::{AnalysisInput, CoordinationInput, SpecialistInput, StageInput};
pub use pipeline::TreatmentPipeline;
pub use prompt::{PromptTemplate, assemble, format_patient_data};
pub use report::TreatmentReport;
pub use roles::{AgentRole, StageProfile};
