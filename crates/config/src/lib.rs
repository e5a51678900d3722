//! Configuration loading, validation, and management for CarePlan.
//!
//! Loads configuration from `~/.careplan/config.toml` with environment
//! variable overrides. Validates all settings at startup, before any
//! provider or embedder is contacted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.careplan/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Retrieval (corpus building and lookup) settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Stage pipeline settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Patient dataset settings
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("retrieval", &self.retrieval)
            .field("pipeline", &self.pipeline)
            .field("dataset", &self.dataset)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// Which embedder builds and queries the corpora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderKind {
    /// Local feature-hashing embedder. No network, deterministic.
    Hashing,
    /// The configured provider's `/embeddings` endpoint.
    Provider,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Target chunk length in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Hits per retrieval
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_embedder")]
    pub embedder: EmbedderKind,

    /// Embedding model when `embedder = "provider"`
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Vector dimension. Enforced for provider embeddings.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Where persisted corpora live. Defaults to `~/.careplan/index`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<PathBuf>,

    /// Limit the patient corpus to a deterministic sample of this size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_sample_size: Option<usize>,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_top_k() -> usize {
    3
}
fn default_embedder() -> EmbedderKind {
    EmbedderKind::Hashing
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_dimension() -> usize {
    384
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            embedder: default_embedder(),
            embedding_model: default_embedding_model(),
            dimension: default_dimension(),
            index_dir: None,
            patient_sample_size: None,
        }
    }
}

impl RetrievalConfig {
    /// The configured index directory, or `~/.careplan/index`.
    pub fn index_dir(&self) -> PathBuf {
        self.index_dir
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("index"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound for a single stage's LLM call
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,

    /// Run diet, medical and fitness stages concurrently
    #[serde(default = "default_true")]
    pub parallel_specialists: bool,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Stage template overrides keyed by stage key (`diet_plan`, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub templates: HashMap<String, String>,
}

fn default_stage_timeout() -> u64 {
    180
}
fn default_temperature() -> f32 {
    0.7
}
fn default_true() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage_timeout_secs: default_stage_timeout(),
            parallel_specialists: true,
            temperature: default_temperature(),
            max_tokens: None,
            templates: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetConfig {
    /// CSV file with the patient records. Unset means the bundled sample.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.careplan/config.toml).
    ///
    /// Environment variables override the file:
    /// - `CAREPLAN_API_KEY`, then `OPENAI_API_KEY` (only when no key is configured)
    /// - `CAREPLAN_PROVIDER`
    /// - `CAREPLAN_MODEL`, then `OPENAI_MODEL`
    /// - `CAREPLAN_DATASET`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("CAREPLAN_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("CAREPLAN_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("CAREPLAN_MODEL").or_else(|| lookup("OPENAI_MODEL")) {
            self.default_model = model;
        }

        if let Some(path) = lookup("CAREPLAN_DATASET") {
            self.dataset.path = Some(PathBuf::from(path));
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".careplan")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if !(0.0..=2.0).contains(&p.temperature) {
            return Err(ConfigError::ValidationError(
                "pipeline.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if p.stage_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.stage_timeout_secs must be > 0".into(),
            ));
        }

        let r = &self.retrieval;
        if r.chunk_size == 0 {
            return Err(ConfigError::ValidationError("retrieval.chunk_size must be > 0".into()));
        }
        if r.chunk_overlap >= r.chunk_size {
            return Err(ConfigError::ValidationError(format!(
                "retrieval.chunk_overlap ({}) must be smaller than chunk_size ({})",
                r.chunk_overlap, r.chunk_size
            )));
        }
        if r.top_k == 0 {
            return Err(ConfigError::ValidationError("retrieval.top_k must be > 0".into()));
        }
        if r.dimension == 0 {
            return Err(ConfigError::ValidationError("retrieval.dimension must be > 0".into()));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            retrieval: RetrievalConfig::default(),
            pipeline: PipelineConfig::default(),
            dataset: DatasetConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for careplan_core::Error {
    fn from(e: ConfigError) -> Self {
        careplan_core::Error::Config { message: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.retrieval.chunk_size, 1000);
        assert_eq!(config.retrieval.chunk_overlap, 200);
        assert!(config.pipeline.parallel_specialists);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_provider, config.default_provider);
        assert_eq!(parsed.retrieval.top_k, config.retrieval.top_k);
        assert_eq!(parsed.retrieval.embedder, EmbedderKind::Hashing);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let mut config = AppConfig::default();
        config.retrieval.chunk_overlap = 1000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap"));
    }

    #[test]
    fn zero_top_k_and_timeout_rejected() {
        let mut config = AppConfig::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.stage_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        let config = result.unwrap();
        assert_eq!(config.default_provider, "openai");
    }

    #[test]
    fn load_from_file_with_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_model = "gpt-4o"

[retrieval]
top_k = 5
embedder = "provider"
patient_sample_size = 500

[pipeline]
stage_timeout_secs = 30
parallel_specialists = false

[pipeline.templates]
diet_plan = "Plan meals for:\n{patient_data}"

[providers.openai]
api_key = "sk-test"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.embedder, EmbedderKind::Provider);
        assert_eq!(config.retrieval.patient_sample_size, Some(500));
        assert_eq!(config.retrieval.chunk_size, 1000);
        assert!(!config.pipeline.parallel_specialists);
        assert!(config.pipeline.templates["diet_plan"].contains("{patient_data}"));
        assert!(config.has_api_key());
    }

    #[test]
    fn invalid_file_is_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\nchunk_size = 100\nchunk_overlap = 150\n").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));

        std::fs::write(&path, "this is = = not toml").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("CAREPLAN_DATASET", "/data/nfhs.csv"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.dataset.path, Some(PathBuf::from("/data/nfhs.csv")));
    }

    #[test]
    fn careplan_env_takes_priority() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            ("CAREPLAN_API_KEY", "sk-careplan"),
            ("OPENAI_API_KEY", "sk-openai"),
            ("CAREPLAN_MODEL", "llama3"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("CAREPLAN_PROVIDER", "ollama"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("sk-careplan"));
        assert_eq!(config.default_model, "llama3");
        assert_eq!(config.default_provider, "ollama");
    }

    #[test]
    fn configured_key_not_overridden_by_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(env(&[("OPENAI_API_KEY", "sk-env")]));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let mut config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-nested".into()),
                api_url: None,
                default_model: None,
            },
        );
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("sk-nested"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o-mini"));
        assert!(toml_str.contains("chunk_size = 1000"));
    }
}
