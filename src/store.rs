//! Conversation storage.
//!
//! A [`ConversationStore`] holds one session's ordered messages. It only
//! grows by appending, and the only in-place change it allows is attaching
//! a result to a pending tool invocation.
//!
//! A store can be backed by a sessions directory, in which case each
//! session is a JSONL file (`<id>.jsonl`) plus an entry in `index.json`.
//! Appends are JSONL appends; result updates rewrite the session file since
//! they change an existing line.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, Role, ToolState};

/// Metadata for a single session, stored in the session index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    pub id: String,
    pub title: Option<String>,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: usize,
}

/// Index of all sessions, persisted as `index.json`.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct SessionIndex {
    pub sessions: Vec<SessionMeta>,
}

pub struct ConversationStore {
    id: String,
    model: String,
    messages: Vec<Message>,
    /// Sessions directory; `None` keeps everything in memory.
    dir: Option<PathBuf>,
}

impl ConversationStore {
    /// Creates a store that is never written to disk.
    pub fn in_memory(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            messages: Vec::new(),
            dir: None,
        }
    }

    /// Opens the session `id` under `dir`, creating it if it does not exist.
    pub fn open_or_create(dir: &Path, id: &str, model: &str) -> Result<Self> {
        validate_id(id)?;
        if session_path(dir, id).exists() {
            Self::open(dir, id)
        } else {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create sessions directory {:?}", dir))?;
            Ok(Self {
                id: id.to_string(),
                model: model.to_string(),
                messages: Vec::new(),
                dir: Some(dir.to_path_buf()),
            })
        }
    }

    /// Loads an existing session from its JSONL file.
    pub fn open(dir: &Path, id: &str) -> Result<Self> {
        validate_id(id)?;
        let file_path = session_path(dir, id);
        let model = load_index(dir)?
            .sessions
            .into_iter()
            .find(|s| s.id == id)
            .map(|s| s.model)
            .unwrap_or_default();

        let file = fs::File::open(&file_path)
            .with_context(|| format!("Failed to open session file {:?}", file_path))?;
        let mut messages = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let msg: Message = serde_json::from_str(&line)
                .with_context(|| "Failed to parse message from session file")?;
            messages.push(msg);
        }

        Ok(Self {
            id: id.to_string(),
            model,
            messages,
            dir: Some(dir.to_path_buf()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Appends a message, flushing it to disk first when persisted.
    pub fn append(&mut self, msg: Message) -> Result<()> {
        if let Some(dir) = &self.dir {
            let path = session_path(dir, &self.id);
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open session file {:?}", path))?;
            writeln!(file, "{}", serde_json::to_string(&msg)?)?;
            file.flush()?;
        }

        self.messages.push(msg);
        self.update_index()
    }

    /// Attaches `result` to the pending invocation `tool_call_id`.
    ///
    /// Returns `false` when no pending invocation has that id; resolved
    /// invocations are never overwritten.
    pub fn set_result(&mut self, tool_call_id: &str, result: Value) -> Result<bool> {
        let target = self
            .messages
            .iter_mut()
            .rev()
            .flat_map(|m| m.tool_invocations_mut())
            .find(|inv| inv.tool_call_id == tool_call_id && inv.is_pending());
        let Some(invocation) = target else {
            return Ok(false);
        };
        invocation.state = ToolState::Result(result);
        self.rewrite()?;
        Ok(true)
    }

    /// Returns the session title derived from the first user message.
    ///
    /// Truncates to 50 characters. Returns `None` if no user message exists.
    pub fn title(&self) -> Option<String> {
        self.messages.iter().find(|m| m.role == Role::User).map(|m| {
            let text = m.text();
            if text.chars().count() > 50 {
                let truncated: String = text.chars().take(50).collect();
                format!("{}...", truncated)
            } else {
                text
            }
        })
    }

    /// Rewrites the whole session file from memory.
    fn rewrite(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let path = session_path(dir, &self.id);
        let tmp = path.with_extension("jsonl.tmp");
        let mut contents = String::new();
        for msg in &self.messages {
            contents.push_str(&serde_json::to_string(msg)?);
            contents.push('\n');
        }
        fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write session file {:?}", tmp))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace session file {:?}", path))?;
        self.update_index()
    }

    /// Updates (or creates) this session's entry in the index file.
    fn update_index(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let mut index = load_index(dir)?;
        let now = Utc::now().to_rfc3339();

        if let Some(entry) = index.sessions.iter_mut().find(|s| s.id == self.id) {
            entry.title = self.title();
            entry.updated_at = now;
            entry.message_count = self.messages.len();
        } else {
            index.sessions.push(SessionMeta {
                id: self.id.clone(),
                title: self.title(),
                model: self.model.clone(),
                created_at: now.clone(),
                updated_at: now,
                message_count: self.messages.len(),
            });
        }

        let json = serde_json::to_string_pretty(&index)?;
        fs::write(index_path(dir), json).with_context(|| "Failed to write session index")?;
        Ok(())
    }

    /// Returns metadata for all sessions under `dir`.
    pub fn list_all(dir: &Path) -> Result<Vec<SessionMeta>> {
        Ok(load_index(dir)?.sessions)
    }

    /// Deletes a session's JSONL file and removes it from the index.
    pub fn delete(dir: &Path, id: &str) -> Result<()> {
        validate_id(id)?;
        let path = session_path(dir, id);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete session file {:?}", path))?;
        }

        let mut index = load_index(dir)?;
        index.sessions.retain(|s| s.id != id);
        if dir.exists() {
            let json = serde_json::to_string_pretty(&index)?;
            fs::write(index_path(dir), json).with_context(|| "Failed to update session index")?;
        }
        Ok(())
    }
}

/// Session ids come from URLs, so they must be safe file names.
pub fn validate_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        bail!("Invalid session id: {:?}", id);
    }
    Ok(())
}

/// Loads the session index, returning a default empty index if the file doesn't exist.
fn load_index(dir: &Path) -> Result<SessionIndex> {
    let path = index_path(dir);
    if !path.exists() {
        return Ok(SessionIndex::default());
    }
    let contents = fs::read_to_string(&path).with_context(|| "Failed to read session index")?;
    serde_json::from_str(&contents).with_context(|| "Failed to parse session index")
}

fn session_path(dir: &Path, id: &str) -> PathBuf {
    dir.join(format!("{}.jsonl", id))
}

fn index_path(dir: &Path) -> PathBuf {
    dir.join("index.json")
}
