//! rig-core backed [`ModelClient`].
//!
//! Contains the [`Provider`] struct which wraps rig-core provider clients
//! behind enum dispatch. Each turn builds an agent with the registry's tool
//! definitions attached and streams a single completion; tool calls in the
//! stream are collected as pending invocations for the session to resolve,
//! never executed here.

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use rig::client::CompletionClient;
use rig::message::{
    AssistantContent, Message as RigMessage, Text, ToolCall as RigToolCall, ToolFunction,
};
use rig::providers::{anthropic, openai, openrouter};
use rig::streaming::{StreamedAssistantContent, StreamingCompletion};
use rig::OneOrMany;

use super::kind::ProviderKind;
use super::resolve::ModelSelection;
use super::ModelClient;
use crate::config::Config;
use crate::message::{Message, Part, Role, ToolInvocation};
use crate::output::Renderer;
use crate::tools::ToolRegistry;

/// Internal enum wrapping provider-specific clients.
enum ClientKind {
    Anthropic(anthropic::Client),
    OpenAI(openai::Client),
    OpenRouter(openrouter::Client),
    Ollama(openai::Client),
}

/// A configured LLM provider ready to handle completion requests.
///
/// Agents are constructed on each call since they are cheap to create and
/// the system prompt comes from the conversation itself.
pub struct Provider {
    client: ClientKind,
    model: String,
    max_tokens: u64,
}

/// Dispatches an operation across provider-specific clients.
///
/// Matches on [`ClientKind`] and executes the same block for each variant,
/// letting the compiler monomorphize per provider.
macro_rules! dispatch {
    ($self:expr, |$client:ident| $body:expr) => {
        match &$self.client {
            ClientKind::Anthropic($client) => $body,
            ClientKind::OpenAI($client) => $body,
            ClientKind::OpenRouter($client) => $body,
            ClientKind::Ollama($client) => $body,
        }
    };
}

/// Builds an agent with tool definitions attached.
///
/// The builder changes type when a preamble is set, so both paths are
/// spelled out.
macro_rules! with_agent_tools {
    ($client:expr, $model:expr, $max_tokens:expr, $sys:expr, $rig_tools:expr, |$agent:ident| $body:expr) => {{
        let $agent = if let Some(sys) = $sys {
            $client
                .agent($model)
                .preamble(sys)
                .max_tokens($max_tokens)
                .tools($rig_tools)
                .build()
        } else {
            $client
                .agent($model)
                .max_tokens($max_tokens)
                .tools($rig_tools)
                .build()
        };
        $body
    }};
}

/// Accumulates one streamed assistant turn into ordered parts.
#[derive(Default)]
struct TurnBuilder {
    parts: Vec<Part>,
    text: String,
}

impl TurnBuilder {
    fn push_text(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn push_call(&mut self, invocation: ToolInvocation) {
        self.flush_text();
        self.parts.push(Part::ToolInvocation(invocation));
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            self.parts.push(Part::Text {
                text: std::mem::take(&mut self.text),
            });
        }
    }

    fn finish(mut self) -> Message {
        self.flush_text();
        Message::assistant(self.parts)
    }
}

impl Provider {
    /// Creates a new [`Provider`] from the loaded application config.
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is found for the selected provider
    /// or if client construction fails.
    pub fn from_config(config: &Config, selection: &ModelSelection) -> Result<Self> {
        let client = match selection.provider {
            ProviderKind::Anthropic => {
                let api_key = config
                    .resolve_api_key("anthropic")
                    .context("No API key found for Anthropic. Set ANTHROPIC_API_KEY or configure it in config.toml")?;
                ClientKind::Anthropic(
                    anthropic::Client::new(&api_key)
                        .context("Failed to create Anthropic client")?,
                )
            }
            ProviderKind::OpenAI => {
                let api_key = config
                    .resolve_api_key("openai")
                    .context("No API key found for OpenAI. Set OPENAI_API_KEY or configure it in config.toml")?;
                ClientKind::OpenAI(
                    openai::Client::new(&api_key).context("Failed to create OpenAI client")?,
                )
            }
            ProviderKind::OpenRouter => {
                let api_key = config
                    .resolve_api_key("openrouter")
                    .context("No API key found for OpenRouter. Set OPENROUTER_API_KEY or configure it in config.toml")?;
                ClientKind::OpenRouter(
                    openrouter::Client::new(&api_key)
                        .context("Failed to create OpenRouter client")?,
                )
            }
            ProviderKind::Ollama => {
                let base_url = config.ollama_base_url();
                ClientKind::Ollama(
                    openai::Client::builder()
                        .api_key("ollama")
                        .base_url(format!("{}/v1", base_url))
                        .build()
                        .context("Failed to create Ollama client")?,
                )
            }
        };
        Ok(Self {
            client,
            model: selection.model.clone(),
            max_tokens: config.max_tokens(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl ModelClient for Provider {
    async fn stream_turn(
        &self,
        history: &[Message],
        tools: &ToolRegistry,
        renderer: &mut dyn Renderer,
    ) -> Result<Message> {
        // First System message becomes the preamble
        let system_prompt = history
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| m.text());

        let mut chat_history: Vec<RigMessage> =
            history.iter().flat_map(convert_message_to_rig).collect();
        let prompt = chat_history
            .pop()
            .ok_or_else(|| anyhow!("Cannot request a completion for an empty conversation"))?;

        let mut turn = TurnBuilder::default();

        dispatch!(self, |client| {
            // Build rig_tools inside dispatch! so each match arm gets a fresh Vec
            let rig_tools = tools.to_rig_tools();
            let mut stream = with_agent_tools!(
                client,
                &self.model,
                self.max_tokens,
                system_prompt.as_deref(),
                rig_tools,
                |agent| {
                    agent
                        .stream_completion(prompt.clone(), chat_history.clone())
                        .await?
                        .stream()
                        .await?
                }
            );
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(StreamedAssistantContent::Text(Text { text })) => {
                        renderer.render_token(&text);
                        turn.push_text(&text);
                    }
                    Ok(StreamedAssistantContent::ToolCall { tool_call, .. }) => {
                        let invocation = ToolInvocation::call(
                            tool_call.id,
                            tool_call.function.name,
                            tool_call.function.arguments,
                        );
                        renderer.tool_call(&invocation);
                        turn.push_call(invocation);
                    }
                    Ok(_) => {
                        // Deltas, reasoning and the final usage item carry nothing we store
                    }
                    Err(err) => {
                        renderer.render_error(&err.to_string());
                        anyhow::bail!("Streaming error: {}", err);
                    }
                }
            }
        });

        Ok(turn.finish())
    }
}

/// Converts one of our messages to rig-core messages.
///
/// - **User** → `RigMessage::User` with text content
/// - **Assistant** → `RigMessage::Assistant` with text and `ToolCall` items,
///   followed by one tool-result message per resolved invocation
/// - **System** → nothing (extracted as preamble separately)
fn convert_message_to_rig(msg: &Message) -> Vec<RigMessage> {
    match msg.role {
        Role::System => Vec::new(),
        Role::User => vec![RigMessage::user(msg.text())],
        Role::Assistant => {
            let mut items: Vec<AssistantContent> = Vec::new();
            let mut results: Vec<RigMessage> = Vec::new();
            for part in &msg.parts {
                match part {
                    Part::Text { text } if !text.is_empty() => {
                        items.push(AssistantContent::Text(Text { text: text.clone() }));
                    }
                    Part::Text { .. } => {}
                    Part::ToolInvocation(inv) => {
                        items.push(AssistantContent::ToolCall(RigToolCall::new(
                            inv.tool_call_id.clone(),
                            ToolFunction::new(inv.tool_name.clone(), inv.args.clone()),
                        )));
                        if let Some(result) = inv.result_text() {
                            results.push(RigMessage::tool_result(inv.tool_call_id.clone(), result));
                        }
                    }
                }
            }
            let Ok(content) = OneOrMany::many(items) else {
                return Vec::new();
            };
            let mut converted = vec![RigMessage::Assistant { id: None, content }];
            converted.extend(results);
            converted
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolved_calls_are_followed_by_results() {
        let mut inv = ToolInvocation::call("t1", "getWeatherInformation", json!({"city": "Paris"}));
        inv.state = crate::message::ToolState::Result(json!({"tempC": 18}));
        let msg = Message::assistant(vec![
            Part::Text {
                text: "Checking.".into(),
            },
            Part::ToolInvocation(inv),
        ]);

        let converted = convert_message_to_rig(&msg);

        assert_eq!(converted.len(), 2);
        match &converted[0] {
            RigMessage::Assistant { content, .. } => assert_eq!(content.len(), 2),
            other => panic!("expected assistant message, got {other:?}"),
        }
        assert!(matches!(converted[1], RigMessage::User { .. }));
    }

    #[test]
    fn system_and_empty_assistant_messages_are_skipped() {
        assert!(convert_message_to_rig(&Message::system("be brief")).is_empty());
        assert!(convert_message_to_rig(&Message::assistant(Vec::new())).is_empty());
    }

    #[test]
    fn turn_builder_keeps_part_order() {
        let mut turn = TurnBuilder::default();
        turn.push_text("Let me ");
        turn.push_text("check.");
        turn.push_call(ToolInvocation::call("t1", "getLocalTime", json!({})));
        turn.push_text("Done.");
        let msg = turn.finish();

        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.parts.len(), 3);
        assert_eq!(msg.parts[0], Part::Text { text: "Let me check.".into() });
        assert!(matches!(msg.parts[1], Part::ToolInvocation(_)));
        assert_eq!(msg.parts[2], Part::Text { text: "Done.".into() });
    }
}
