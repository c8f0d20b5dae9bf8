//! Slash command handlers for the chat REPL.
//!
//! Dispatches `/history`, `/pending`, `/tools` and `/help`.

use colored::Colorize;

use crate::format;
use crate::message::Role;
use crate::session::ChatSession;

/// Action returned by slash command handling.
pub(crate) enum CommandAction {
    /// Command was handled successfully; continue the REPL loop.
    Continue,
    /// Unknown command was entered.
    Unknown(String),
}

pub(crate) fn handle_slash_command(command: &str, session: &ChatSession) -> CommandAction {
    match command {
        "/history" => {
            print_history(session);
            CommandAction::Continue
        }
        "/pending" => {
            let pending = session.pending_invocations();
            if pending.is_empty() {
                println!("{}", "Nothing waiting on approval.".dimmed());
            }
            for inv in pending {
                println!("{}", format::format_invocation(inv));
            }
            CommandAction::Continue
        }
        "/tools" => {
            for contract in session.registry().contracts() {
                let mode = if contract.requires_confirmation {
                    "ask".yellow()
                } else {
                    "auto".green()
                };
                println!("  {:<24} {} {}", contract.name.cyan(), mode, contract.description.dimmed());
            }
            CommandAction::Continue
        }
        "/help" => {
            println!("{}", "Commands:".bold());
            println!("  {} - show conversation history", "/history".cyan());
            println!("  {} - show tool calls waiting on approval", "/pending".cyan());
            println!("  {} - list available tools", "/tools".cyan());
            println!("  {} - show this help", "/help".cyan());
            println!("  {} - exit", "Ctrl+D".cyan());
            CommandAction::Continue
        }
        _ => CommandAction::Unknown(command.to_string()),
    }
}

pub(crate) fn print_history(session: &ChatSession) {
    for msg in session.messages() {
        if msg.role == Role::System {
            continue;
        }
        println!("{}", format::format_message(msg));
        println!();
    }
}
