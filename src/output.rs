//! Output rendering abstraction.
//!
//! Everything a session produces while handling one inbound item goes
//! through a single [`Renderer`]: streamed model tokens, tool calls as the
//! model emits them, tool results as they are resolved, and status changes.
//! Calls happen in the order things are produced, so a consumer draining
//! the renderer sees one ordered stream.
//!
//! [`ChannelRenderer`] feeds that stream into an unbounded channel drained by
//! the WebSocket writer; [`StdoutRenderer`] prints to the terminal.

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};
use tokio::sync::mpsc;

use crate::message::{Message, ToolInvocation};
use crate::session::SessionStatus;

/// Trait for rendering session output.
pub trait Renderer: Send {
    /// Render a single token as it arrives.
    fn render_token(&mut self, token: &str);

    /// The model requested a tool call.
    fn tool_call(&mut self, invocation: &ToolInvocation);

    /// A tool call reached its result.
    fn tool_result(&mut self, invocation: &ToolInvocation);

    /// A message was appended, or its tool results changed.
    fn message(&mut self, message: &Message);

    fn status(&mut self, status: &SessionStatus);

    /// Called when the model has finished responding.
    fn render_done(&mut self);

    /// Called when an error occurs during streaming.
    fn render_error(&mut self, err: &str);
}

/// One outbound frame on the WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected { session_id: String },
    History { messages: Vec<Message> },
    TextDelta { text: String },
    ToolCall { invocation: ToolInvocation },
    ToolResult { invocation: ToolInvocation },
    Message { message: Message },
    Status { status: SessionStatus },
    Done,
    Error { message: String },
    Pong,
}

/// Sends every rendered item into a channel, in order.
///
/// A closed receiver means the client went away; the session still finishes
/// its work and further events are dropped.
pub struct ChannelRenderer {
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl ChannelRenderer {
    pub fn new(tx: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { tx }
    }

    pub fn emit(&mut self, event: ServerEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("dropping event, receiver closed");
        }
    }
}

impl Renderer for ChannelRenderer {
    fn render_token(&mut self, token: &str) {
        self.emit(ServerEvent::TextDelta {
            text: token.to_string(),
        });
    }

    fn tool_call(&mut self, invocation: &ToolInvocation) {
        self.emit(ServerEvent::ToolCall {
            invocation: invocation.clone(),
        });
    }

    fn tool_result(&mut self, invocation: &ToolInvocation) {
        self.emit(ServerEvent::ToolResult {
            invocation: invocation.clone(),
        });
    }

    fn message(&mut self, message: &Message) {
        self.emit(ServerEvent::Message {
            message: message.clone(),
        });
    }

    fn status(&mut self, status: &SessionStatus) {
        self.emit(ServerEvent::Status {
            status: status.clone(),
        });
    }

    fn render_done(&mut self) {
        self.emit(ServerEvent::Done);
    }

    fn render_error(&mut self, err: &str) {
        self.emit(ServerEvent::Error {
            message: err.to_string(),
        });
    }
}

/// Renders streaming output directly to stdout.
///
/// Each token is printed immediately with an explicit flush so the user
/// sees a "typing" effect.
pub struct StdoutRenderer {
    token_count: usize,
    /// Whether the cursor is mid-line after streamed tokens.
    in_text: bool,
}

impl StdoutRenderer {
    pub fn new() -> Self {
        Self {
            token_count: 0,
            in_text: false,
        }
    }

    fn end_text(&mut self) {
        if self.in_text {
            println!();
            self.in_text = false;
        }
    }
}

impl Default for StdoutRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for StdoutRenderer {
    fn render_token(&mut self, token: &str) {
        print!("{}", token);
        io::stdout().flush().ok();
        self.token_count += 1;
        self.in_text = true;
    }

    fn tool_call(&mut self, invocation: &ToolInvocation) {
        self.end_text();
        println!(
            "{} {} {}",
            "tool:".yellow(),
            invocation.tool_name.bold(),
            invocation.args.to_string().dimmed()
        );
    }

    fn tool_result(&mut self, invocation: &ToolInvocation) {
        self.end_text();
        let result = invocation.result_text().unwrap_or_default();
        println!(
            "{} {} {}",
            "result:".yellow(),
            invocation.tool_name.bold(),
            result.dimmed()
        );
    }

    fn message(&mut self, _message: &Message) {}

    fn status(&mut self, status: &SessionStatus) {
        if let SessionStatus::PendingConfirmation { tool_call_ids } = status {
            self.end_text();
            println!(
                "{}",
                format!("[waiting on approval for {} call(s)]", tool_call_ids.len()).dimmed()
            );
        }
    }

    fn render_done(&mut self) {
        self.end_text();
        println!();
        println!("{}", format!("[{} tokens]", self.token_count).dimmed());
        self.token_count = 0;
    }

    fn render_error(&mut self, err: &str) {
        self.end_text();
        eprintln!("{} {}", "error:".red().bold(), err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_renderer_preserves_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut renderer = ChannelRenderer::new(tx);
        let call = ToolInvocation::call("t1", "getLocalTime", json!({"location": "Oslo"}));

        renderer.render_token("Hel");
        renderer.tool_call(&call);
        renderer.render_token("lo");
        renderer.render_done();
        drop(renderer);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert_eq!(
            events,
            vec![
                ServerEvent::TextDelta { text: "Hel".into() },
                ServerEvent::ToolCall { invocation: call },
                ServerEvent::TextDelta { text: "lo".into() },
                ServerEvent::Done,
            ]
        );
    }

    #[test]
    fn closed_receiver_is_not_an_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut renderer = ChannelRenderer::new(tx);
        renderer.render_token("ignored");
        renderer.render_error("also ignored");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ServerEvent::Status {
            status: SessionStatus::PendingConfirmation {
                tool_call_ids: vec!["t1".into()],
            },
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "status",
                "status": {"state": "pending_confirmation", "toolCallIds": ["t1"]}
            })
        );
        assert_eq!(
            serde_json::to_value(ServerEvent::Done).unwrap(),
            json!({"type": "done"})
        );
    }
}
