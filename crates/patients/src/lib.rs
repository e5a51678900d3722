//! Patient record provider for CarePlan.
//!
//! Loads the NFHS-5 obesity extract (or the bundled sample), decodes its
//! coded columns, and serves random, indexed and filtered lookups. Also
//! turns records into documents for the `patient_data` corpus.

pub mod codes;
pub mod dataset;
pub mod documents;

pub use dataset::{Criteria, DatasetStats, PatientDataset};
pub use documents::{patient_document, patient_documents};
