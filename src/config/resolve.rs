//! Environment variable substitution, API key resolution and typed accessors.

use super::types::{Config, ProviderEntry};

use crate::constants::{
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_STEPS, DEFAULT_TOOL_TIMEOUT_SECS, MAX_TOKENS,
    OLLAMA_DEFAULT_BASE_URL,
};

impl Config {
    /// Resolve {env:VAR_NAME} patterns in string fields.
    pub(super) fn resolve_substitutions(&mut self) {
        self.model = Self::resolve_str(&self.model);
        if let Some(ref mut sp) = self.system_prompt {
            *sp = Self::resolve_str(sp);
        }
        if let Some(ref mut dp) = self.default_provider {
            *dp = Self::resolve_str(dp);
        }
        if let Some(ref mut listen) = self.server.listen {
            *listen = Self::resolve_str(listen);
        }
        Self::resolve_provider_entry(&mut self.provider.openai);
        Self::resolve_provider_entry(&mut self.provider.anthropic);
        Self::resolve_provider_entry(&mut self.provider.ollama);
        Self::resolve_provider_entry(&mut self.provider.openrouter);
    }

    fn resolve_provider_entry(entry: &mut Option<ProviderEntry>) {
        if let Some(ref mut e) = entry {
            if let Some(ref mut key) = e.api_key {
                *key = Self::resolve_str(key);
            }
            if let Some(ref mut url) = e.base_url {
                *url = Self::resolve_str(url);
            }
        }
    }

    /// Replace {env:VAR} with the environment variable value.
    fn resolve_str(s: &str) -> String {
        let mut result = s.to_string();
        while let Some(start) = result.find("{env:") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 5..start + end];
                let value = std::env::var(var_name).unwrap_or_default();
                result = format!(
                    "{}{}{}",
                    &result[..start],
                    value,
                    &result[start + end + 1..]
                );
            } else {
                break;
            }
        }
        result
    }

    /// Resolve API key for a provider: env var first, then config value.
    /// Empty strings (an unset `{env:VAR}`) count as missing.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        let env_key = format!("{}_API_KEY", provider.to_uppercase());
        if let Ok(val) = std::env::var(&env_key) {
            if !val.is_empty() {
                return Some(val);
            }
        }

        self.entry(provider)
            .and_then(|e| e.api_key.clone())
            .filter(|k| !k.is_empty())
    }

    fn entry(&self, provider: &str) -> Option<&ProviderEntry> {
        match provider {
            "openai" => self.provider.openai.as_ref(),
            "anthropic" => self.provider.anthropic.as_ref(),
            "ollama" => self.provider.ollama.as_ref(),
            "openrouter" => self.provider.openrouter.as_ref(),
            _ => None,
        }
    }

    /// Get the configured default provider name, if any.
    pub fn provider_name(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Get the model name from config, stripping provider prefix if present.
    /// Returns None if the model is the compile-time default (meaning user hasn't configured it).
    pub fn model_name(&self) -> Option<String> {
        let m = &self.model;
        if m == crate::constants::DEFAULT_MODEL {
            return None;
        }
        if let Some((_prov, model)) = m.split_once('/') {
            Some(model.to_string())
        } else {
            Some(m.to_string())
        }
    }

    pub fn ollama_base_url(&self) -> String {
        self.entry("ollama")
            .and_then(|e| e.base_url.clone())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| OLLAMA_DEFAULT_BASE_URL.to_string())
    }

    pub fn listen_addr(&self) -> String {
        self.server
            .listen
            .clone()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
    }

    /// Whether session transcripts are written to disk.
    pub fn persist_sessions(&self) -> bool {
        self.server.persist_sessions.unwrap_or(true)
    }

    /// Model round-trips per inbound message, never below one.
    pub fn max_steps(&self) -> usize {
        self.agent.max_steps.unwrap_or(DEFAULT_MAX_STEPS).max(1)
    }

    pub fn tool_timeout_secs(&self) -> u64 {
        self.agent.tool_timeout_secs.unwrap_or(DEFAULT_TOOL_TIMEOUT_SECS)
    }

    pub fn max_tokens(&self) -> u64 {
        self.agent.max_tokens.unwrap_or(MAX_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_env_vars() {
        std::env::set_var("AGENT_CHAT_TEST_KEY", "sk-test");
        assert_eq!(
            Config::resolve_str("Bearer {env:AGENT_CHAT_TEST_KEY}!"),
            "Bearer sk-test!"
        );
        assert_eq!(Config::resolve_str("{env:AGENT_CHAT_UNSET_VAR}"), "");
        assert_eq!(Config::resolve_str("{env:broken"), "{env:broken");
    }

    #[test]
    fn unset_placeholder_key_counts_as_missing() {
        let mut config: Config = toml::from_str(
            r#"
[provider.openrouter]
api_key = "{env:AGENT_CHAT_NEVER_SET}"
"#,
        )
        .unwrap();
        config.resolve_substitutions();
        std::env::remove_var("OPENROUTER_API_KEY");
        assert_eq!(config.resolve_api_key("openrouter"), None);
    }

    #[test]
    fn accessors_fall_back_to_defaults() {
        let config = Config::default();
        assert_eq!(config.listen_addr(), DEFAULT_LISTEN_ADDR);
        assert_eq!(config.max_steps(), DEFAULT_MAX_STEPS);
        assert_eq!(config.tool_timeout_secs(), DEFAULT_TOOL_TIMEOUT_SECS);
        assert_eq!(config.max_tokens(), MAX_TOKENS);
        assert_eq!(config.ollama_base_url(), OLLAMA_DEFAULT_BASE_URL);
        assert!(config.persist_sessions());
        assert_eq!(config.model_name(), None);
    }

    #[test]
    fn zero_max_steps_is_clamped() {
        let mut config = Config::default();
        config.agent.max_steps = Some(0);
        assert_eq!(config.max_steps(), 1);
    }
}
