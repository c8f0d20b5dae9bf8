//! Session management CLI operations.
//!
//! Handles listing and deleting stored sessions through the
//! `agent-chat sessions` subcommand family, with partial session ID
//! matching (git-style short IDs).

use anyhow::Result;
use colored::Colorize;

use super::SessionAction;
use crate::config::Config;
use crate::store::{validate_id, ConversationStore, SessionMeta};

/// Dispatches a session subcommand to its handler.
pub(crate) fn handle_session(action: SessionAction) -> Result<()> {
    match action {
        SessionAction::List => session_list(),
        SessionAction::Delete { id } => {
            let sessions = ConversationStore::list_all(&Config::sessions_dir()?)?;
            let full_id = resolve_session_id(&sessions, &id)?
                .ok_or_else(|| anyhow::anyhow!("No session found matching '{}'", id))?;
            session_delete(&full_id)
        }
    }
}

/// Resolves a partial id for `chat --session`: an unambiguous prefix of a
/// stored session resumes it, anything else names a new session.
pub(crate) fn resolve_or_new(config: &Config, partial: &str) -> Result<String> {
    if config.persist_sessions() {
        let sessions = ConversationStore::list_all(&Config::sessions_dir()?)?;
        if let Some(id) = resolve_session_id(&sessions, partial)? {
            return Ok(id);
        }
    }
    validate_id(partial)?;
    Ok(partial.to_string())
}

/// Matches `partial` against stored session ids.
///
/// An exact match always wins. Returns `None` when nothing matches and an
/// error when several sessions share the prefix.
fn resolve_session_id(sessions: &[SessionMeta], partial: &str) -> Result<Option<String>> {
    if sessions.iter().any(|s| s.id == partial) {
        return Ok(Some(partial.to_string()));
    }
    let matches: Vec<_> = sessions.iter().filter(|s| s.id.starts_with(partial)).collect();
    match matches.len() {
        0 => Ok(None),
        1 => Ok(Some(matches[0].id.clone())),
        _ => {
            eprintln!("{} Multiple sessions match '{}':", "ambiguous:".yellow(), partial);
            for s in &matches {
                let title = s.title.as_deref().unwrap_or("(untitled)");
                eprintln!("  {} {}", short_id(&s.id), title.dimmed());
            }
            anyhow::bail!("Provide more characters to disambiguate")
        }
    }
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

/// Lists all saved sessions, most recently updated first.
fn session_list() -> Result<()> {
    let mut sessions = ConversationStore::list_all(&Config::sessions_dir()?)?;
    if sessions.is_empty() {
        println!("{}", "No sessions found.".dimmed());
        println!("Start one with: {}", "agent-chat chat".cyan());
        return Ok(());
    }
    sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

    println!(
        "{} {} {} {}",
        format!("{:<10}", "ID").bold(),
        format!("{:<42}", "TITLE").bold(),
        format!("{:<6}", "MSGS").bold(),
        "UPDATED".bold(),
    );

    for s in &sessions {
        let title_str = s.title.as_deref().unwrap_or("(untitled)");
        let title = if title_str.chars().count() > 40 {
            let truncated: String = title_str.chars().take(37).collect();
            format!("{}...", truncated)
        } else {
            title_str.to_string()
        };
        let updated = chrono::DateTime::parse_from_rfc3339(&s.updated_at)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|_| s.updated_at.clone());

        // Pad first, then colorize to avoid ANSI escape code width issues
        println!(
            "{} {} {} {}",
            format!("{:<10}", short_id(&s.id)).cyan(),
            format!("{:<42}", title),
            format!("{:<6}", s.message_count).yellow(),
            updated.dimmed(),
        );
    }
    println!();
    println!(
        "{} {} sessions. Resume with: {}",
        "total:".dimmed(),
        sessions.len(),
        "agent-chat chat --session <id>".cyan()
    );
    Ok(())
}

fn session_delete(id: &str) -> Result<()> {
    let dir = Config::sessions_dir()?;
    let sessions = ConversationStore::list_all(&dir)?;
    let meta = sessions
        .iter()
        .find(|s| s.id == id)
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", id))?;
    let title = meta.title.as_deref().unwrap_or("(untitled)");
    println!("Deleting session {} (\"{}\")", short_id(id).cyan(), title);
    ConversationStore::delete(&dir, id)?;
    println!("{}", "Deleted.".green());
    Ok(())
}
