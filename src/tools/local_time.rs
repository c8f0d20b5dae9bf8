use anyhow::Result;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ToolContract, ToolExecutor};

pub const NAME: &str = "getLocalTime";

pub struct LocalTimeTool;

#[derive(Deserialize)]
struct LocalTimeInput {
    location: String,
}

/// Runs without confirmation: reading the clock has no side effects.
pub fn contract() -> ToolContract {
    ToolContract::new(
        NAME,
        "Get the current time for a location.",
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City or region to report the time for"
                }
            },
            "required": ["location"]
        }),
    )
    .with_executor(LocalTimeTool)
}

#[async_trait::async_trait]
impl ToolExecutor for LocalTimeTool {
    async fn execute(&self, args: Value) -> Result<Value> {
        let input: LocalTimeInput = serde_json::from_value(args)?;
        let now = Utc::now();
        // No timezone database is bundled, so the time is reported in UTC and
        // the model is left to convert it.
        Ok(json!({
            "location": input.location,
            "time": now.format("%H:%M").to_string(),
            "timezone": "UTC",
            "timestamp": now.to_rfc3339(),
        }))
    }
}
