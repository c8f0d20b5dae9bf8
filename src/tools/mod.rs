pub mod confirm;
pub mod local_time;
pub mod rig_adapter;
pub mod weather;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;

/// Runs a tool on the server once the model (and, if required, a human)
/// has asked for it.
#[async_trait::async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute the tool with the given JSON arguments.
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// Declared contract of a tool: what the model sees, whether a human must
/// approve each call, and what runs once it is allowed.
#[derive(Clone)]
pub struct ToolContract {
    /// Unique name the LLM uses to call this tool.
    pub name: String,
    /// Human-readable description for the LLM.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub parameters: Value,
    pub requires_confirmation: bool,
    /// `None` for confirmation tools whose result is the approval itself.
    pub executor: Option<Arc<dyn ToolExecutor>>,
}

impl ToolContract {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            requires_confirmation: false,
            executor: None,
        }
    }

    pub fn with_executor(mut self, executor: impl ToolExecutor + 'static) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn requiring_confirmation(mut self) -> Self {
        self.requires_confirmation = true;
        self
    }
}

impl std::fmt::Debug for ToolContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContract")
            .field("name", &self.name)
            .field("requires_confirmation", &self.requires_confirmation)
            .field("has_executor", &self.executor.is_some())
            .finish()
    }
}

/// Holds all registered tool contracts, keyed by name.
pub struct ToolRegistry {
    tools: Vec<ToolContract>,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tools: Vec::new(),
            timeout,
        }
    }

    /// Register a tool. Called during startup.
    ///
    /// Rejects duplicate names, and tools that would run without approval
    /// but have nothing to run.
    pub fn register(&mut self, contract: ToolContract) -> Result<()> {
        if self.get(&contract.name).is_some() {
            bail!("Tool '{}' is already registered", contract.name);
        }
        if !contract.requires_confirmation && contract.executor.is_none() {
            bail!(
                "Tool '{}' runs without confirmation but declares no executor",
                contract.name
            );
        }
        self.tools.push(contract);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ToolContract> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn requires_confirmation(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.requires_confirmation)
    }

    pub fn contracts(&self) -> impl Iterator<Item = &ToolContract> {
        self.tools.iter()
    }

    /// Look up a tool by name and run its executor, bounded by the registry
    /// timeout.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        let contract = self
            .get(name)
            .ok_or_else(|| anyhow!("Unknown tool: {}", name))?;
        let executor = contract
            .executor
            .as_ref()
            .ok_or_else(|| anyhow!("Tool '{}' has no executor", name))?;
        match tokio::time::timeout(self.timeout, executor.execute(args)).await {
            Ok(result) => result,
            Err(_) => bail!("timed out after {}s", self.timeout.as_secs_f32()),
        }
    }

    /// Like [`ToolRegistry::execute`], but failures become a result value
    /// describing them instead of an error.
    pub async fn execute_captured(&self, name: &str, args: Value) -> Value {
        match self.execute(name, args).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(tool = name, error = %format!("{err:#}"), "tool execution failed");
                failure_value(name, &err)
            }
        }
    }

    /// How many tools are registered.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Converts all registered tools into rig-core [`ToolDyn`] trait objects.
    ///
    /// Returns a fresh `Vec` each call so the result can be moved into an
    /// agent builder's `.tools()` without borrow/move conflicts.
    ///
    /// [`ToolDyn`]: rig::tool::ToolDyn
    pub fn to_rig_tools(&self) -> Vec<Box<dyn rig::tool::ToolDyn>> {
        self.tools
            .iter()
            .map(|t| {
                Box::new(rig_adapter::RigToolAdapter::new(t.clone())) as Box<dyn rig::tool::ToolDyn>
            })
            .collect()
    }
}

/// Result value recorded when a tool fails to run.
pub fn failure_value(tool_name: &str, err: &anyhow::Error) -> Value {
    Value::String(format!("Error executing {}: {:#}", tool_name, err))
}

impl ToolRegistry {
    /// Create a registry with all built-in tools, with the configured
    /// permissions applied.
    pub fn with_builtins(config: &Config) -> Result<Self> {
        let mut registry = Self::new(Duration::from_secs(config.tool_timeout_secs()));
        let builtins = [
            weather::contract(&config.weather),
            local_time::contract(),
            confirm::contract(),
        ];
        for contract in builtins {
            if let Some(contract) = config.permissions.apply(contract) {
                registry.register(contract)?;
            }
        }
        Ok(registry)
    }
}
