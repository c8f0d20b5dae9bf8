//! Entry point for agent-chat, a chat agent whose sensitive tool calls wait
//! for a human yes/no before they run.
//!
//! This binary loads environment variables, parses CLI arguments via [`cli`],
//! sets up logging, and dispatches to the appropriate subcommand handler.

mod chat;
mod cli;
mod config;
mod constants;
mod format;
mod message;
mod output;
mod permissions;
mod provider;
mod resolver;
mod server;
mod session;
mod store;
mod tools;

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_level()));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    cli::run(cli).await
}
