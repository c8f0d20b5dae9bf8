//! Command-line interface definition and dispatch.
//!
//! Uses [`clap`] for argument parsing with derive macros. Each subcommand is
//! routed to its handler; session listing and deletion live in the
//! [`session`] submodule.

mod session;

use crate::{chat, config, provider, server, session::SessionDefaults, session::SessionManager};
use crate::tools::ToolRegistry;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::SocketAddr;
use std::sync::Arc;

/// Top-level CLI structure.
#[derive(Parser)]
#[command(
    name = "agent-chat",
    about = "A chat agent that asks before it runs sensitive tools"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
///
/// The `///` doc comments on variants double as `--help` text rendered by clap.
#[derive(Subcommand)]
pub enum Commands {
    /// Serve chat sessions over WebSocket
    Serve {
        /// Address to listen on (overrides config)
        #[arg(short, long)]
        listen: Option<String>,
        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,
        /// Provider to use (anthropic, openai, openrouter, ollama)
        #[arg(short, long)]
        provider: Option<String>,
    },
    /// Start an interactive chat session in the terminal
    Chat {
        /// Resume or name a session (supports partial IDs)
        #[arg(short, long)]
        session: Option<String>,
        /// Provider to use (anthropic, openai, openrouter, ollama)
        #[arg(long)]
        provider: Option<String>,
        /// Model to use (overrides config)
        #[arg(short, long)]
        model: Option<String>,
    },
    /// List the tools the agent can call
    Tools,
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Manage stored sessions
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current config
    Show,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// List all sessions
    List,
    /// Delete a session by ID (supports partial IDs)
    Delete { id: String },
}

/// Parses command-line arguments into a [`Cli`] struct.
pub fn parse() -> Cli {
    Cli::parse()
}

impl Cli {
    /// Log level used when `RUST_LOG` is unset. The REPL shares the
    /// terminal with logs, so it stays quiet.
    pub fn default_log_level(&self) -> &'static str {
        match self.command {
            Commands::Serve { .. } => "info",
            _ => "warn",
        }
    }
}

/// Dispatches the parsed CLI command to its handler.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            listen,
            model,
            provider: provider_name,
        } => {
            let config = config::Config::load()?;
            let selection =
                provider::resolve_model(provider_name.as_deref(), model.as_deref(), &config)?;
            let listen = listen.unwrap_or_else(|| config.listen_addr());
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("Invalid listen address: {}", listen))?;

            let manager = session_manager(&config, &selection)?;
            tracing::info!(
                provider = %selection.provider,
                model = %selection.model,
                "starting server"
            );
            let state = server::AppState {
                sessions: Arc::new(manager),
            };
            server::serve(addr, state).await
        }
        Commands::Chat {
            session,
            provider: provider_name,
            model,
        } => {
            let config = config::Config::load()?;
            let selection =
                provider::resolve_model(provider_name.as_deref(), model.as_deref(), &config)?;
            let session_id = match session {
                Some(partial) => session::resolve_or_new(&config, &partial)?,
                None => uuid::Uuid::new_v4().to_string(),
            };
            let manager = session_manager(&config, &selection)?;
            chat::run_chat(manager, session_id, &selection.model).await
        }
        Commands::Tools => {
            let config = config::Config::load()?;
            let registry = ToolRegistry::with_builtins(&config)?;
            for contract in registry.contracts() {
                let mode = if contract.requires_confirmation {
                    "ask".yellow()
                } else {
                    "auto".green()
                };
                println!("{:<24} {:<5} {}", contract.name.cyan(), mode, contract.description);
            }
            Ok(())
        }
        Commands::Config { action } => {
            let config = config::Config::load()?;
            match action {
                ConfigAction::Show => {
                    let path = config::Config::config_path()?;
                    println!("{} {}", "Config path:".bold(), path.display());
                    println!();
                    let toml_str = toml::to_string_pretty(&config)?;
                    println!("{}", toml_str);
                }
            }
            Ok(())
        }
        Commands::Sessions { action } => session::handle_session(action),
    }
}

/// Builds the provider, tool registry and session manager shared by the
/// server and the REPL.
fn session_manager(
    config: &config::Config,
    selection: &provider::ModelSelection,
) -> Result<SessionManager> {
    let provider = provider::Provider::from_config(config, selection)?;
    let registry = ToolRegistry::with_builtins(config)?;
    tracing::debug!(tools = registry.len(), "tool registry ready");
    let sessions_dir = if config.persist_sessions() {
        Some(config::Config::sessions_dir()?)
    } else {
        None
    };
    let defaults = SessionDefaults {
        model_name: provider.model().to_string(),
        system_prompt: config.system_prompt.clone(),
        max_steps: config.max_steps(),
        sessions_dir,
    };
    Ok(SessionManager::new(
        Arc::new(registry),
        Arc::new(provider),
        defaults,
    ))
}
