pub mod index;
pub mod onboard;
pub mod patients;
pub mod plan;
pub mod query;
pub mod stats;

use std::path::Path;

use careplan_config::AppConfig;

/// Load config from `path` (or the default location), then apply
/// environment overrides and validate.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        None => AppConfig::load(),
        Some(path) => AppConfig::load_from(path).and_then(|mut config| {
            config.apply_env(|key| std::env::var(key).ok());
            config.validate()?;
            Ok(config)
        }),
    };
    let config = config.map_err(|e| format!("Failed to load config: {e}"))?;
    tracing::debug!(?config, "Configuration loaded");
    Ok(config)
}

/// Fail early with setup instructions when the provider needs a key.
pub fn require_api_key(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.has_api_key() || config.default_provider == "ollama" || config.default_provider == "vllm" {
        return Ok(());
    }

    eprintln!();
    eprintln!("  ERROR: No API key configured for provider '{}'!", config.default_provider);
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    export OPENAI_API_KEY=sk-...");
    eprintln!("    export CAREPLAN_API_KEY=sk-...     (any OpenAI-compatible provider)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
    eprintln!();
    Err("No API key found. See above for setup instructions.".into())
}
