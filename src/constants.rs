//! Centralized constants for agent-chat.
//!
//! All magic numbers, default strings, and configuration constants live here
//! so they can be changed in one place.

/// Application name used in CLI output and directory paths.
pub const APP_NAME: &str = "agent-chat";

/// Default LLM model identifier.
pub const DEFAULT_MODEL: &str = DEFAULT_OPENAI_MODEL;

/// Maximum tokens for LLM completions.
pub const MAX_TOKENS: u64 = 500;

/// Default system prompt prepended to all conversations.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that can do various tasks. \
If the user asks for the weather, use the getWeatherInformation tool. \
If the user asks for the local time, use the getLocalTime tool. \
Ask for confirmation with askForConfirmation before doing anything irreversible.";

/// Configuration filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Per-project configuration filename.
pub const PROJECT_CONFIG_FILENAME: &str = "agent-chat.toml";

/// Readline history filename.
pub const HISTORY_FILENAME: &str = "chat_history.txt";

// --- Provider defaults ---

/// Default provider when none is configured.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Default LLM model identifier for Anthropic.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5";

/// Default LLM model identifier for OpenAI.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4.1";

/// Default LLM model identifier for OpenRouter.
pub const DEFAULT_OPENROUTER_MODEL: &str = "openai/gpt-4.1-mini";

/// Default base URL for local Ollama server.
pub const OLLAMA_DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Default LLM model identifier for Ollama.
pub const OLLAMA_DEFAULT_MODEL: &str = "llama3.1";

// --- Server ---

/// Address the WebSocket server binds when none is configured.
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// First assistant message sent on every new connection.
pub const GREETING: &str = "Hello! I'm your AI assistant. How can I help you today?";

/// Assistant text sent when the model call fails.
pub const APOLOGY: &str =
    "I apologize, but I encountered an error processing your message. Please try again.";

// --- Agent loop ---

/// Model round-trips allowed per inbound message.
pub const DEFAULT_MAX_STEPS: usize = 5;

/// Seconds a tool executor may run.
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

// --- Weather tool ---

/// Open-Meteo forecast API base.
pub const WEATHER_FORECAST_URL: &str = "https://api.open-meteo.com";

/// Open-Meteo geocoding API base.
pub const WEATHER_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com";
