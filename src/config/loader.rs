//! File loading and merging for the configuration.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::types::{default_model, AgentConfig, Config, ServerConfig, WeatherConfig};
use crate::permissions::PermissionConfig;

impl Config {
    /// Loads the global config from `~/.config/agent-chat/config.toml`.
    ///
    /// If no config file exists, creates one with sensible defaults
    /// (including `{env:VAR}` placeholders for API keys) and returns it.
    pub(super) fn load_global() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            let default_toml = Self::default_toml();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &default_toml)
                .with_context(|| format!("Failed to write default config to {:?}", path))?;
            return Self::parse(&default_toml, &path);
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Self::parse(&contents, &path)
    }

    fn default_toml() -> String {
        format!(
            r#"model = "{}"

[provider.openai]
api_key = "{{env:OPENAI_API_KEY}}"

[provider.anthropic]
api_key = "{{env:ANTHROPIC_API_KEY}}"

[provider.openrouter]
api_key = "{{env:OPENROUTER_API_KEY}}"

[provider.ollama]
base_url = "http://localhost:11434"

[permissions.tools]
getWeatherInformation = "ask"
getLocalTime = "allow"

[server]
listen = "{}"
"#,
            default_model(),
            crate::constants::DEFAULT_LISTEN_ADDR,
        )
    }

    fn parse(contents: &str, path: &Path) -> Result<Self> {
        toml::from_str(contents).with_context(|| format!("Failed to parse config at {:?}", path))
    }

    /// Look for the project config in the current dir, then walk up to the git root.
    pub(super) fn load_project() -> Result<Option<Config>> {
        let mut dir = std::env::current_dir()?;
        loop {
            let candidate = dir.join(crate::constants::PROJECT_CONFIG_FILENAME);
            if candidate.exists() {
                let contents = fs::read_to_string(&candidate)?;
                return Self::parse(&contents, &candidate).map(Some);
            }
            // Stop at git root or filesystem root
            if dir.join(".git").exists() || !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Merge project config over global config.
    /// Project values win when present.
    pub(super) fn merge(global: Config, project: Config) -> Config {
        Config {
            model: if project.model != default_model() {
                project.model
            } else {
                global.model
            },
            // TODO: merge provider entries field by field so a project can
            // override just a base_url
            provider: global.provider,
            default_provider: project.default_provider.or(global.default_provider),
            system_prompt: project.system_prompt.or(global.system_prompt),
            permissions: PermissionConfig::merge(global.permissions, project.permissions),
            server: ServerConfig {
                listen: project.server.listen.or(global.server.listen),
                persist_sessions: project
                    .server
                    .persist_sessions
                    .or(global.server.persist_sessions),
            },
            agent: AgentConfig {
                max_steps: project.agent.max_steps.or(global.agent.max_steps),
                tool_timeout_secs: project
                    .agent
                    .tool_timeout_secs
                    .or(global.agent.tool_timeout_secs),
                max_tokens: project.agent.max_tokens.or(global.agent.max_tokens),
            },
            weather: WeatherConfig {
                base_url: project.weather.base_url.or(global.weather.base_url),
                geocoding_url: project.weather.geocoding_url.or(global.weather.geocoding_url),
            },
        }
    }
}
