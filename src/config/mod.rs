//! Configuration types and path resolution.
//!
//! Settings live as TOML at the platform's XDG config path
//! (e.g. `~/.config/agent-chat/config.toml` on Linux), optionally overridden
//! by an `agent-chat.toml` in the project. Session transcripts go under the
//! XDG data directory (`~/.local/share/agent-chat/sessions/`).

mod loader;
mod paths;
mod resolve;
mod types;

pub use types::{Config, WeatherConfig};

use anyhow::Result;

impl Config {
    /// Load config with precedence: project > global > defaults.
    /// Creates default config file if none exists.
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project()?;

        let mut config = global;
        if let Some(proj) = project {
            config = Self::merge(config, proj);
        }

        config.resolve_substitutions();
        Ok(config)
    }
}
