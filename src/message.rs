//! Message types for the conversation history.
//!
//! A [`Message`] is an ordered list of [`Part`]s. Text parts carry what the
//! user or the model wrote; tool-invocation parts carry a call the model
//! requested and, once resolved, its result. These are our internal types,
//! converted to rig-core's `Message` when sent to the LLM.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The role of a message sender in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Lifecycle of a tool invocation.
///
/// The result only exists once the invocation has been resolved, so the two
/// are carried together rather than as a state tag plus an optional value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", content = "result", rename_all = "lowercase")]
pub enum ToolState {
    /// Requested by the model, no result attached yet.
    Call,
    /// Resolved with a final value.
    Result(Value),
}

/// A tool invocation requested by the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    /// Unique within a conversation; joins a request to its resolution.
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    #[serde(flatten)]
    pub state: ToolState,
}

impl ToolInvocation {
    /// Creates an invocation in the [`ToolState::Call`] state.
    pub fn call(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        args: Value,
    ) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            args,
            state: ToolState::Call,
        }
    }

    /// Whether this invocation is still waiting for a result.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ToolState::Call)
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.state {
            ToolState::Call => None,
            ToolState::Result(value) => Some(value),
        }
    }

    /// Returns the result rendered as plain text, the way models expect tool
    /// output. String results are passed through without JSON quoting.
    pub fn result_text(&self) -> Option<String> {
        self.result().map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// One ordered piece of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text { text: String },
    ToolInvocation(ToolInvocation),
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            parts,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::Text { text: text.into() }])
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::Text { text: text.into() }])
    }

    pub fn assistant(parts: Vec<Part>) -> Self {
        Self::new(Role::Assistant, parts)
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![Part::Text { text: text.into() }])
    }

    /// Concatenation of all text parts, in order.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::ToolInvocation(_) => None,
            })
            .collect()
    }

    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|part| match part {
            Part::ToolInvocation(invocation) => Some(invocation),
            Part::Text { .. } => None,
        })
    }

    pub fn tool_invocations_mut(&mut self) -> impl Iterator<Item = &mut ToolInvocation> {
        self.parts.iter_mut().filter_map(|part| match part {
            Part::ToolInvocation(invocation) => Some(invocation),
            Part::Text { .. } => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "you"),
            Role::Assistant => write!(f, "agent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_invocation_wire_shape() {
        let pending = Part::ToolInvocation(ToolInvocation::call(
            "t1",
            "getWeatherInformation",
            json!({"city": "Paris"}),
        ));
        assert_eq!(
            serde_json::to_value(&pending).unwrap(),
            json!({
                "type": "tool-invocation",
                "toolCallId": "t1",
                "toolName": "getWeatherInformation",
                "args": {"city": "Paris"},
                "state": "call"
            })
        );

        let resolved: Part = serde_json::from_value(json!({
            "type": "tool-invocation",
            "toolCallId": "t1",
            "toolName": "getWeatherInformation",
            "args": {"city": "Paris"},
            "state": "result",
            "result": {"tempC": 18}
        }))
        .unwrap();
        match resolved {
            Part::ToolInvocation(invocation) => {
                assert!(!invocation.is_pending());
                assert_eq!(invocation.result(), Some(&json!({"tempC": 18})));
            }
            other => panic!("expected tool invocation, got {other:?}"),
        }
    }

    #[test]
    fn text_joins_text_parts_only() {
        let msg = Message::assistant(vec![
            Part::Text { text: "Checking ".into() },
            Part::ToolInvocation(ToolInvocation::call("t1", "getLocalTime", json!({}))),
            Part::Text { text: "now.".into() },
        ]);
        assert_eq!(msg.text(), "Checking now.");
        assert_eq!(msg.tool_invocations().count(), 1);
    }

    #[test]
    fn result_text_unquotes_strings() {
        let mut invocation = ToolInvocation::call("t1", "askForConfirmation", json!({}));
        assert_eq!(invocation.result_text(), None);
        invocation.state = ToolState::Result(json!("Approved"));
        assert_eq!(invocation.result_text().as_deref(), Some("Approved"));
        invocation.state = ToolState::Result(json!({"tempC": 18}));
        assert_eq!(invocation.result_text().as_deref(), Some(r#"{"tempC":18}"#));
    }
}
