//! LLM provider abstraction.
//!
//! The session talks to the model through [`ModelClient`]. [`Provider`] is
//! the rig-core backed implementation, with enum dispatch over Anthropic,
//! OpenAI, OpenRouter, and Ollama selected by [`kind::ProviderKind`].

mod client;
mod kind;
mod resolve;

use anyhow::Result;

use crate::message::Message;
use crate::output::Renderer;
use crate::tools::ToolRegistry;

pub use client::Provider;
pub use resolve::{resolve_model, ModelSelection};

/// One streamed model round-trip.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends the resolved history with the registry's tool definitions and
    /// returns the assistant message the model produced: text and/or new
    /// tool calls, all in [`ToolState::Call`]. Tokens and tool calls are
    /// rendered as they arrive. Never executes tools.
    ///
    /// [`ToolState::Call`]: crate::message::ToolState::Call
    async fn stream_turn(
        &self,
        history: &[Message],
        tools: &ToolRegistry,
        renderer: &mut dyn Renderer,
    ) -> Result<Message>;
}
