//! Reconciliation of pending tool calls against human decisions.
//!
//! When the model asks for a tool that requires confirmation, the call sits
//! in [`ToolState::Call`] until the client sends an [`ApprovalDecision`] for
//! it. [`resolve`] walks the most recent message and turns each decided call
//! into a result: the executor's output when approved, a rejection marker
//! otherwise. Earlier messages are already resolved by the time a new one is
//! appended and are never re-checked here.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::message::{Message, ToolInvocation, ToolState};
use crate::tools::{failure_value, ToolRegistry};

/// Result recorded for a call the user rejected.
pub const REJECTED: &str = "Rejected";

/// Result recorded for an approved call whose tool has no executor.
pub const APPROVED: &str = "Approved";

/// A human's answer to one pending tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalDecision {
    pub tool_call_id: String,
    pub approved: bool,
}

impl ApprovalDecision {
    pub fn approve(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            approved: true,
        }
    }

    pub fn reject(tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            approved: false,
        }
    }
}

/// Decisions keyed by tool call id.
pub type Decisions = HashMap<String, ApprovalDecision>;

/// Indexes a batch of decisions by tool call id. A later decision for the
/// same id replaces an earlier one.
pub fn index_decisions(decisions: impl IntoIterator<Item = ApprovalDecision>) -> Decisions {
    decisions
        .into_iter()
        .map(|d| (d.tool_call_id.clone(), d))
        .collect()
}

/// Resolves every decided, confirmation-requiring call in the last message.
///
/// Calls without a decision stay pending, and calls to tools that do not
/// require confirmation are left for the session to execute. Decisions that
/// match nothing are ignored, so resubmitting the same batch is harmless.
/// Executor failures are recorded as the call's result; this never fails.
///
/// The session applies [`resolve_call`] one invocation at a time instead,
/// storing each result as it goes.
#[allow(dead_code)]
pub async fn resolve(
    mut messages: Vec<Message>,
    decisions: &Decisions,
    registry: &ToolRegistry,
) -> Vec<Message> {
    let Some(last) = messages.last_mut() else {
        return messages;
    };

    for invocation in last.tool_invocations_mut() {
        if let Some(result) = resolve_call(invocation, decisions, registry).await {
            invocation.state = ToolState::Result(result);
        }
    }

    messages
}

/// Result for one invocation, or `None` when it is not a pending
/// confirmation call or has no decision.
///
/// Lets a caller persist each result before the next executor runs.
pub async fn resolve_call(
    invocation: &ToolInvocation,
    decisions: &Decisions,
    registry: &ToolRegistry,
) -> Option<Value> {
    if !invocation.is_pending() || !registry.requires_confirmation(&invocation.tool_name) {
        return None;
    }
    let decision = decisions.get(&invocation.tool_call_id)?;
    Some(decide(invocation, decision.approved, registry).await)
}

async fn decide(invocation: &ToolInvocation, approved: bool, registry: &ToolRegistry) -> Value {
    let name = invocation.tool_name.as_str();
    if !approved {
        tracing::debug!(tool = name, call = %invocation.tool_call_id, "tool call rejected");
        return Value::String(REJECTED.to_string());
    }

    let has_executor = registry.get(name).is_some_and(|t| t.executor.is_some());
    if !has_executor {
        tracing::debug!(tool = name, call = %invocation.tool_call_id, "tool call approved");
        return Value::String(APPROVED.to_string());
    }

    tracing::debug!(tool = name, call = %invocation.tool_call_id, "running approved tool call");
    match registry.execute(name, invocation.args.clone()).await {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(tool = name, error = %format!("{err:#}"), "approved tool call failed");
            failure_value(name, &err)
        }
    }
}

/// Ids of confirmation-requiring calls in the last message that still wait
/// on a decision.
pub fn pending_confirmations(messages: &[Message], registry: &ToolRegistry) -> Vec<String> {
    pending_calls(messages, |name| registry.requires_confirmation(name))
}

/// Ids of calls in the last message that need no confirmation but have not
/// been executed yet. Must be empty before the history goes back to the
/// model.
pub fn unresolved_auto_calls(messages: &[Message], registry: &ToolRegistry) -> Vec<String> {
    pending_calls(messages, |name| !registry.requires_confirmation(name))
}

fn pending_calls(messages: &[Message], mut select: impl FnMut(&str) -> bool) -> Vec<String> {
    messages
        .last()
        .map(|last| {
            last.tool_invocations()
                .filter(|inv| inv.is_pending() && select(&inv.tool_name))
                .map(|inv| inv.tool_call_id.clone())
                .collect()
        })
        .unwrap_or_default()
}
