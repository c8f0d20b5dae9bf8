//! Chat session controller.
//!
//! A [`ChatSession`] owns one conversation and processes inbound items one
//! at a time: user text, or a batch of approval decisions. It decides when
//! the conversation may go back to the model (nothing waits on a human) and
//! runs the model/tool loop until the model stops asking for tools or a
//! call needs approval.
//!
//! [`SessionManager`] maps session ids to independently locked sessions so
//! the server can run different conversations in parallel while each one
//! stays strictly sequential.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};

use crate::message::{Message, ToolInvocation};
use crate::output::Renderer;
use crate::provider::ModelClient;
use crate::resolver::{self, ApprovalDecision};
use crate::store::{ConversationStore, SessionMeta};
use crate::tools::ToolRegistry;

/// Whether the conversation can take new user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum SessionStatus {
    Ready,
    /// Input stays disabled until these calls are decided.
    PendingConfirmation { tool_call_ids: Vec<String> },
}

/// An item delivered by the transport.
#[derive(Debug, Clone)]
pub enum Inbound {
    UserText(String),
    Decisions(Vec<ApprovalDecision>),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("waiting on approval for tool calls: {}", .0.join(", "))]
    PendingConfirmation(Vec<String>),
    /// Calls that should have been resolved before resubmission were not.
    #[error("tool calls left unresolved before resubmission: {}", .0.join(", "))]
    UnresolvedCall(Vec<String>),
    #[error("model request failed: {0:#}")]
    Model(anyhow::Error),
    #[error("conversation store error: {0:#}")]
    Store(anyhow::Error),
}

pub struct ChatSession {
    store: ConversationStore,
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelClient>,
    max_steps: usize,
}

impl ChatSession {
    pub fn new(
        store: ConversationStore,
        registry: Arc<ToolRegistry>,
        model: Arc<dyn ModelClient>,
        max_steps: usize,
    ) -> Self {
        Self {
            store,
            registry,
            model,
            max_steps: max_steps.max(1),
        }
    }

    pub fn id(&self) -> &str {
        self.store.id()
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Pending confirmation calls in the last message, in message order.
    pub fn pending_invocations(&self) -> Vec<&ToolInvocation> {
        self.messages()
            .last()
            .map(|last| {
                last.tool_invocations()
                    .filter(|inv| {
                        inv.is_pending() && self.registry.requires_confirmation(&inv.tool_name)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn status(&self) -> SessionStatus {
        let pending = resolver::pending_confirmations(self.messages(), &self.registry);
        if pending.is_empty() {
            SessionStatus::Ready
        } else {
            SessionStatus::PendingConfirmation {
                tool_call_ids: pending,
            }
        }
    }

    /// Appends a message outside the normal flow, e.g. the system prompt of
    /// a fresh session.
    pub fn seed(&mut self, message: Message) -> Result<()> {
        self.store.append(message)
    }

    /// Processes one inbound item to completion.
    pub async fn handle(
        &mut self,
        inbound: Inbound,
        renderer: &mut dyn Renderer,
    ) -> Result<SessionStatus, ChatError> {
        match inbound {
            Inbound::UserText(text) => self.submit_user_text(text, renderer).await,
            Inbound::Decisions(decisions) => self.apply_decisions(decisions, renderer).await,
        }
    }

    async fn submit_user_text(
        &mut self,
        text: String,
        renderer: &mut dyn Renderer,
    ) -> Result<SessionStatus, ChatError> {
        if let SessionStatus::PendingConfirmation { tool_call_ids } = self.status() {
            renderer.status(&SessionStatus::PendingConfirmation {
                tool_call_ids: tool_call_ids.clone(),
            });
            return Err(ChatError::PendingConfirmation(tool_call_ids));
        }

        let message = Message::user(text);
        self.store
            .append(message.clone())
            .map_err(ChatError::Store)?;
        renderer.message(&message);
        self.run_turns(renderer).await
    }

    async fn apply_decisions(
        &mut self,
        decisions: Vec<ApprovalDecision>,
        renderer: &mut dyn Renderer,
    ) -> Result<SessionStatus, ChatError> {
        let decisions = resolver::index_decisions(decisions);
        let targets: Vec<ToolInvocation> = self
            .messages()
            .last()
            .map(|last| last.tool_invocations().cloned().collect())
            .unwrap_or_default();

        // Each result is stored before the next executor runs.
        let mut changed = false;
        for mut invocation in targets {
            let Some(result) =
                resolver::resolve_call(&invocation, &decisions, &self.registry).await
            else {
                continue;
            };
            self.store
                .set_result(&invocation.tool_call_id, result.clone())
                .map_err(ChatError::Store)?;
            invocation.state = crate::message::ToolState::Result(result);
            renderer.tool_result(&invocation);
            changed = true;
        }

        let status = self.status();
        if !changed {
            // Duplicate or unmatched decisions: nothing new to send.
            tracing::debug!(session = %self.id(), "decisions matched no pending call");
            renderer.status(&status);
            return Ok(status);
        }
        if let Some(last) = self.messages().last() {
            renderer.message(last);
        }
        if status != SessionStatus::Ready {
            renderer.status(&status);
            return Ok(status);
        }
        self.run_turns(renderer).await
    }

    /// Runs model turns until the model stops calling tools, a call needs
    /// approval, or `max_steps` turns have run.
    async fn run_turns(&mut self, renderer: &mut dyn Renderer) -> Result<SessionStatus, ChatError> {
        for step in 0..self.max_steps {
            self.ensure_resolved()?;

            tracing::debug!(session = %self.id(), step, "requesting model turn");
            let reply = self
                .model
                .stream_turn(self.messages(), &self.registry, renderer)
                .await
                .map_err(ChatError::Model)?;
            if reply.is_empty() {
                break;
            }

            let calls_tools = reply.tool_invocations().next().is_some();
            self.store.append(reply.clone()).map_err(ChatError::Store)?;
            renderer.message(&reply);
            if !calls_tools {
                break;
            }

            self.execute_auto_tools(renderer).await?;
            let status = self.status();
            if status != SessionStatus::Ready {
                renderer.status(&status);
                return Ok(status);
            }
        }

        renderer.render_done();
        let status = self.status();
        renderer.status(&status);
        Ok(status)
    }

    /// Runs every pending call in the last message whose tool needs no
    /// approval. Unknown tools and failures get an error result.
    async fn execute_auto_tools(&mut self, renderer: &mut dyn Renderer) -> Result<(), ChatError> {
        let Some(last) = self.messages().last() else {
            return Ok(());
        };
        let auto: Vec<ToolInvocation> = last
            .tool_invocations()
            .filter(|inv| inv.is_pending() && !self.registry.requires_confirmation(&inv.tool_name))
            .cloned()
            .collect();

        for mut invocation in auto {
            let result = self
                .registry
                .execute_captured(&invocation.tool_name, invocation.args.clone())
                .await;
            self.store
                .set_result(&invocation.tool_call_id, result.clone())
                .map_err(ChatError::Store)?;
            invocation.state = crate::message::ToolState::Result(result);
            renderer.tool_result(&invocation);
        }

        if let Some(last) = self.messages().last() {
            renderer.message(last);
        }
        Ok(())
    }

    /// The history may only go to the model once every call in the last
    /// message has a result.
    fn ensure_resolved(&self) -> Result<(), ChatError> {
        let mut unresolved = resolver::pending_confirmations(self.messages(), &self.registry);
        unresolved.extend(resolver::unresolved_auto_calls(
            self.messages(),
            &self.registry,
        ));
        if unresolved.is_empty() {
            Ok(())
        } else {
            tracing::error!(session = %self.id(), calls = ?unresolved, "refusing to resubmit");
            Err(ChatError::UnresolvedCall(unresolved))
        }
    }
}

/// Settings shared by every session the manager creates.
#[derive(Debug, Clone)]
pub struct SessionDefaults {
    pub model_name: String,
    pub system_prompt: Option<String>,
    pub max_steps: usize,
    /// Sessions directory; `None` keeps sessions in memory only.
    pub sessions_dir: Option<PathBuf>,
}

/// Owns all live sessions, each behind its own lock.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<ChatSession>>>>,
    registry: Arc<ToolRegistry>,
    model: Arc<dyn ModelClient>,
    defaults: SessionDefaults,
}

impl SessionManager {
    pub fn new(
        registry: Arc<ToolRegistry>,
        model: Arc<dyn ModelClient>,
        defaults: SessionDefaults,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            registry,
            model,
            defaults,
        }
    }

    /// Returns the live session `id`, loading it from disk or creating it.
    pub async fn get_or_create(&self, id: &str) -> Result<Arc<Mutex<ChatSession>>> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(session.clone());
        }

        let mut sessions = self.sessions.write().await;
        // Another connection may have created it while we waited.
        if let Some(session) = sessions.get(id) {
            return Ok(session.clone());
        }

        let session = self.build(id)?;
        let session = Arc::new(Mutex::new(session));
        sessions.insert(id.to_string(), session.clone());
        Ok(session)
    }

    /// Returns the session `id` if it is live or stored on disk.
    ///
    /// A stored session that is not live is loaded without being registered,
    /// so read-only lookups do not keep it in memory.
    pub async fn find(&self, id: &str) -> Result<Option<Arc<Mutex<ChatSession>>>> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return Ok(Some(session.clone()));
        }
        if self.list_stored()?.iter().any(|s| s.id == id) {
            Ok(Some(Arc::new(Mutex::new(self.build(id)?))))
        } else {
            Ok(None)
        }
    }

    /// Drops the live session `id` once no connection holds it any more.
    ///
    /// Callers drop their own handle first. Persisted sessions reload from
    /// disk on the next [`get_or_create`](Self::get_or_create); in-memory
    /// ones are gone.
    pub async fn release(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let unshared = sessions
            .get(id)
            .is_some_and(|session| Arc::strong_count(session) == 1);
        if unshared {
            sessions.remove(id);
            tracing::debug!(session = id, "session released");
        }
        unshared
    }

    /// Ids of live sessions, sorted.
    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Metadata of every session on disk; empty when sessions are not persisted.
    pub fn list_stored(&self) -> Result<Vec<SessionMeta>> {
        match &self.defaults.sessions_dir {
            Some(dir) => ConversationStore::list_all(dir),
            None => Ok(Vec::new()),
        }
    }

    fn build(&self, id: &str) -> Result<ChatSession> {
        crate::store::validate_id(id)?;
        let store = match &self.defaults.sessions_dir {
            Some(dir) => ConversationStore::open_or_create(dir, id, &self.defaults.model_name)?,
            None => ConversationStore::in_memory(id, &self.defaults.model_name),
        };
        let fresh = store.messages().is_empty();
        tracing::info!(session = id, model = store.model(), fresh, "session opened");
        let mut session = ChatSession::new(
            store,
            self.registry.clone(),
            self.model.clone(),
            self.defaults.max_steps,
        );
        if fresh {
            if let Some(prompt) = &self.defaults.system_prompt {
                session.seed(Message::system(prompt.clone()))?;
            }
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests;
