//! Struct definitions and serde defaults for the configuration file.

use crate::permissions::PermissionConfig;
use serde::{Deserialize, Serialize};

/// Root configuration, deserialized from `config.toml`.
///
/// Fields use serde defaults so the agent can run with sensible defaults
/// when no config file exists.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Default model identifier (e.g. `"gpt-4.1"`).
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-provider settings.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Default provider name (e.g., "anthropic", "openai").
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Optional system prompt prepended to all conversations.
    #[serde(default = "default_system_prompt")]
    pub system_prompt: Option<String>,
    /// Which tools run immediately, need approval, or are withheld.
    #[serde(default)]
    pub permissions: PermissionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
}

/// Returns the default model identifier.
///
/// Used by serde's `#[serde(default)]` attribute during deserialization.
pub(super) fn default_model() -> String {
    crate::constants::DEFAULT_MODEL.to_string()
}

fn default_system_prompt() -> Option<String> {
    Some(crate::constants::DEFAULT_SYSTEM_PROMPT.to_string())
}

/// Provider-specific configuration map.
///
/// Each field corresponds to a supported LLM provider. Only providers
/// the user has configured will be `Some`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    pub openai: Option<ProviderEntry>,
    pub anthropic: Option<ProviderEntry>,
    pub ollama: Option<ProviderEntry>,
    pub openrouter: Option<ProviderEntry>,
}

/// Connection details for a single LLM provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderEntry {
    /// API key for authentication. Can also be set via environment variables.
    pub api_key: Option<String>,
    /// Custom base URL for the provider's API (useful for proxies or self-hosted instances).
    pub base_url: Option<String>,
}

/// WebSocket server settings.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Address to bind, e.g. `127.0.0.1:8787`.
    pub listen: Option<String>,
    /// Persist sessions to the data directory (default true).
    pub persist_sessions: Option<bool>,
}

/// Limits for the model/tool loop.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct AgentConfig {
    /// Maximum model round-trips per inbound message.
    pub max_steps: Option<usize>,
    /// Seconds a tool executor may run before it is treated as failed.
    pub tool_timeout_secs: Option<u64>,
    pub max_tokens: Option<u64>,
}

/// Endpoints for the weather tool (Open-Meteo compatible).
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct WeatherConfig {
    pub base_url: Option<String>,
    pub geocoding_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            provider: ProviderConfig::default(),
            default_provider: None,
            system_prompt: default_system_prompt(),
            permissions: PermissionConfig::default(),
            server: ServerConfig::default(),
            agent: AgentConfig::default(),
            weather: WeatherConfig::default(),
        }
    }
}
