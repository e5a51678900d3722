//! Error types for the CarePlan domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each component has its own error enum; the top-level [`Error`]
//! wraps them so callers receive a single terminal error object.

use std::time::Duration;

use thiserror::Error;

use crate::stage::Stage;

/// The top-level error type for all CarePlan operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Prompt assembly errors ---
    #[error("Prompt error: {0}")]
    Prompt(#[from] PromptError),

    // --- Pipeline stage errors ---
    #[error(transparent)]
    Stage(#[from] StageExecutionError),

    // --- Patient data errors ---
    #[error("Patient data error: {0}")]
    Patient(#[from] PatientDataError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Component errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    /// The corpus was never built and could not be loaded from disk.
    #[error("Corpus not found: {0}")]
    CorpusNotFound(String),

    /// The embedding step could not run. Callers degrade to empty context.
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Index storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromptError {
    #[error("Template '{template}' references unknown placeholder '{{{placeholder}}}'")]
    MissingPlaceholder { template: String, placeholder: String },

    #[error("Template '{template}' is malformed: {reason}")]
    Malformed { template: String, reason: String },
}

/// Why a single stage invocation failed.
#[derive(Debug, Clone, Error)]
pub enum StageFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("{0}")]
    Provider(#[from] ProviderError),
}

/// A pipeline stage failed; the whole run is aborted and no report exists.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed: {cause}")]
pub struct StageExecutionError {
    pub stage: Stage,
    #[source]
    pub cause: StageFailure,
}

impl StageExecutionError {
    pub fn new(stage: Stage, cause: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatientDataError {
    #[error("Index {index} out of range (dataset has {len} records)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid patient data: {field}: {reason}")]
    InvalidPatientData { field: String, reason: String },

    #[error("Dataset error: {0}")]
    Dataset(String),
}

impl PatientDataError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPatientData {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn stage_error_names_the_stage() {
        let cause = StageFailure::Timeout(Duration::from_secs(30));
        let err: Error = StageExecutionError::new(Stage::MedicalEvaluation, cause).into();
        let text = err.to_string();
        assert!(text.contains("medical_evaluation"));
        assert!(text.contains("30s"));
        assert!(matches!(
            err,
            Error::Stage(StageExecutionError { stage: Stage::MedicalEvaluation, .. })
        ));
    }

    #[test]
    fn sub_second_timeout_keeps_its_precision() {
        let cause = StageFailure::Timeout(Duration::from_millis(250));
        assert!(matches!(cause, StageFailure::Timeout(d) if d.as_millis() == 250));
        assert_eq!(cause.to_string(), "timed out after 250ms");
    }

    #[test]
    fn missing_placeholder_displays_braces() {
        let err = PromptError::MissingPlaceholder {
            template: "diet_plan".into(),
            placeholder: "diagnostic_report".into(),
        };
        assert_eq!(
            err.to_string(),
            "Template 'diet_plan' references unknown placeholder '{diagnostic_report}'"
        );
    }

    #[test]
    fn provider_failure_converts_into_stage_failure() {
        let failure: StageFailure = ProviderError::Network("connection reset".into()).into();
        assert!(failure.to_string().contains("connection reset"));
    }
}
