//! Adapter exposing a [`ToolContract`] as rig-core's [`ToolDyn`].
//!
//! The adapter exists so contracts can be attached to a rig-core agent and
//! their definitions included in LLM API requests. Execution is driven by
//! the chat session, not by rig-core, so `call()` only ever runs tools that
//! need no approval.

use std::pin::Pin;

use rig::completion::ToolDefinition as RigToolDefinition;
use rig::tool::{ToolDyn, ToolError};

use super::ToolContract;

pub struct RigToolAdapter {
    contract: ToolContract,
}

impl RigToolAdapter {
    pub fn new(contract: ToolContract) -> Self {
        Self { contract }
    }
}

impl ToolDyn for RigToolAdapter {
    fn name(&self) -> String {
        self.contract.name.clone()
    }

    fn definition<'a>(
        &'a self,
        _prompt: String,
    ) -> Pin<Box<dyn std::future::Future<Output = RigToolDefinition> + Send + 'a>> {
        let name = self.contract.name.clone();
        let description = self.contract.description.clone();
        let parameters = self.contract.parameters.clone();
        Box::pin(async move {
            RigToolDefinition {
                name,
                description,
                parameters,
            }
        })
    }

    fn call<'a>(
        &'a self,
        args: String,
    ) -> Pin<Box<dyn std::future::Future<Output = Result<String, ToolError>> + Send + 'a>> {
        Box::pin(async move {
            if self.contract.requires_confirmation {
                return Ok(format!(
                    "Error: '{}' requires user confirmation",
                    self.contract.name
                ));
            }
            let input: serde_json::Value =
                serde_json::from_str(&args).map_err(ToolError::JsonError)?;
            let Some(executor) = self.contract.executor.as_ref() else {
                return Ok(format!("Error: '{}' has no executor", self.contract.name));
            };
            // Errors go back as result text; the model reads them like any
            // other output.
            match executor.execute(input).await {
                Ok(serde_json::Value::String(s)) => Ok(s),
                Ok(value) => Ok(value.to_string()),
                Err(e) => Ok(format!("Error: {}", e)),
            }
        })
    }
}
