//! Interactive chat REPL.
//!
//! Provides a multi-turn conversation loop using [`rustyline`] for readline
//! support (history, line editing). Tool calls that need approval are
//! presented one by one with a y/n prompt; the whole batch of answers is
//! then handed to the session, which runs approved tools and resumes the
//! model.

mod commands;

use anyhow::Result;
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::config::Config;
use crate::format;
use crate::message::Role;
use crate::output::StdoutRenderer;
use crate::resolver::ApprovalDecision;
use crate::session::{ChatError, ChatSession, Inbound, SessionManager, SessionStatus};

/// Runs the interactive chat REPL against session `session_id`.
///
/// # Readline behavior
///
/// - **Ctrl+C**: cancels current input, stays in REPL
/// - **Ctrl+D**: exits cleanly with "goodbye."
/// - Readline history is persisted to `~/.cache/agent-chat/chat_history.txt`
pub async fn run_chat(manager: SessionManager, session_id: String, model_name: &str) -> Result<()> {
    let handle = manager.get_or_create(&session_id).await?;
    let mut session = handle.lock().await;

    let resumed = session.messages().iter().any(|m| m.role != Role::System);
    println!(
        "{} [session: {}] [model: {}] (Ctrl+D to exit, /help for commands)",
        if resumed { "resuming" } else { "agent-chat" }.bold().cyan(),
        short_id(session.id()).yellow(),
        model_name.yellow(),
    );
    println!();
    if resumed {
        commands::print_history(&session);
    }

    let mut rl = DefaultEditor::new()?;
    let history_path = Config::cache_dir()?.join(crate::constants::HISTORY_FILENAME);
    if history_path.exists() {
        let _ = rl.load_history(&history_path);
    }

    loop {
        let inbound = if matches!(session.status(), SessionStatus::PendingConfirmation { .. }) {
            match ask_for_decisions(&mut rl, &session) {
                Ok(decisions) => Inbound::Decisions(decisions),
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "goodbye.".dimmed());
                    break;
                }
                Err(e) => {
                    eprintln!("{} {}", "error:".red().bold(), e);
                    break;
                }
            }
        } else {
            match rl.readline(&format!("{} ", ">".green().bold())) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if line.starts_with('/') {
                        match commands::handle_slash_command(&line, &session) {
                            commands::CommandAction::Continue => continue,
                            commands::CommandAction::Unknown(cmd) => {
                                println!("{} Unknown command: {}", "?".yellow(), cmd);
                                continue;
                            }
                        }
                    }
                    let _ = rl.add_history_entry(&line);
                    Inbound::UserText(line)
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C".dimmed());
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "goodbye.".dimmed());
                    break;
                }
                Err(e) => {
                    eprintln!("{} {}", "error:".red().bold(), e);
                    break;
                }
            }
        };

        println!();
        let mut renderer = StdoutRenderer::new();
        match session.handle(inbound, &mut renderer).await {
            Ok(_) => {}
            Err(ChatError::Model(e)) => {
                tracing::warn!(session = %session.id(), error = %e, "model request failed");
                println!("{}", crate::constants::APOLOGY.cyan());
                eprintln!("{} {:#}", "error:".red().bold(), e);
            }
            Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
        }
        println!();
    }

    if let Some(parent) = history_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let _ = rl.save_history(&history_path);

    Ok(())
}

/// Prompts once per pending call and collects the answers.
fn ask_for_decisions(
    rl: &mut DefaultEditor,
    session: &ChatSession,
) -> Result<Vec<ApprovalDecision>, ReadlineError> {
    let mut decisions = Vec::new();
    for inv in session.pending_invocations() {
        println!("{}", format::format_invocation(inv));
        let approved = loop {
            let answer = rl.readline(&format!("{} ", "approve? [y/n]".yellow().bold()))?;
            match answer.trim().to_ascii_lowercase().as_str() {
                "y" | "yes" => break true,
                "n" | "no" => break false,
                _ => println!("{}", "Please answer y or n.".dimmed()),
            }
        };
        decisions.push(ApprovalDecision {
            tool_call_id: inv.tool_call_id.clone(),
            approved,
        });
    }
    Ok(decisions)
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
