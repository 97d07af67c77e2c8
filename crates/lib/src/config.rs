//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relai/config.json`) and environment.
//! Provider credentials are usually supplied via env; the file carries the rest.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Provider settings (model and transcription APIs).
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Tool backend settings (the spawned tool-server process).
    #[serde(default)]
    pub backend: BackendConfig,
}

/// Gateway bind and port settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for the webhook HTTP server (default 8383).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8383
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Model and transcription provider settings. Keys in the file are overridden
/// by ANTHROPIC_API_KEY / OPENAI_API_KEY env vars when set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvidersConfig {
    /// Anthropic API key. Overridden by ANTHROPIC_API_KEY env when set.
    pub anthropic_api_key: Option<String>,
    /// Model id for chat completion (default "claude-sonnet-4-20250514").
    pub model: Option<String>,
    /// OpenAI API key for transcription. Overridden by OPENAI_API_KEY env when set.
    pub openai_api_key: Option<String>,
    /// Transcription model id (default "gpt-4o-transcribe").
    pub transcribe_model: Option<String>,
}

/// Tool backend process settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Path to the tool-server script (.py or .js). Overridden by
    /// RELAI_BACKEND_SERVER env when set.
    pub server_path: Option<PathBuf>,
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Anthropic API key: env ANTHROPIC_API_KEY overrides config.
pub fn resolve_anthropic_key(config: &Config) -> Option<String> {
    env_nonempty("ANTHROPIC_API_KEY").or_else(|| {
        config
            .providers
            .anthropic_api_key
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the OpenAI API key: env OPENAI_API_KEY overrides config.
pub fn resolve_openai_key(config: &Config) -> Option<String> {
    env_nonempty("OPENAI_API_KEY").or_else(|| {
        config
            .providers
            .openai_api_key
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the tool-server script path: env RELAI_BACKEND_SERVER overrides config.
pub fn resolve_backend_server(config: &Config) -> Option<PathBuf> {
    env_nonempty("RELAI_BACKEND_SERVER")
        .map(PathBuf::from)
        .or_else(|| config.backend.server_path.clone())
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAI_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relai").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the default path (or RELAI_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
