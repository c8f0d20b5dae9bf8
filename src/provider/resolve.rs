//! Provider and model selection.

use anyhow::Result;

use super::kind::ProviderKind;
use crate::config::Config;
use crate::constants::DEFAULT_PROVIDER;

/// Resolved provider + model pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub provider: ProviderKind,
    pub model: String,
}

/// Resolve which provider and model to use.
/// Priority: CLI flags > config file > defaults.
///
/// Accepts these formats:
///   --model openai/gpt-4.1  (provider/model shorthand, only when --provider is omitted)
///   --provider openrouter --model "org/model-name"  (slash preserved as model name)
///   --provider openai --model gpt-4.1
///   --provider openai  (uses the provider's default model)
///   (nothing)  (uses the config file, then the built-in default)
pub fn resolve_model(
    cli_provider: Option<&str>,
    cli_model: Option<&str>,
    config: &Config,
) -> Result<ModelSelection> {
    if cli_provider.is_none() {
        if let Some((prov, model)) = cli_model.and_then(|m| m.split_once('/')) {
            if let Ok(provider) = prov.parse::<ProviderKind>() {
                return Ok(ModelSelection {
                    provider,
                    model: model.to_string(),
                });
            }
        }
    }

    let provider: ProviderKind = cli_provider
        .or(config.provider_name())
        .unwrap_or(DEFAULT_PROVIDER)
        .parse()?;

    let model = cli_model
        .map(String::from)
        .or_else(|| config.model_name())
        .unwrap_or_else(|| provider.default_model().to_string());

    Ok(ModelSelection { provider, model })
}
