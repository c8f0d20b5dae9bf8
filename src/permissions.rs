//! Per-tool permission configuration.
//!
//! Permissions decide how each registered tool is offered to the model:
//! run immediately, gated behind a human approval, or withheld entirely.
//! [`PermissionConfig::apply`] rewrites a tool contract accordingly before it
//! lands in the registry.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::tools::ToolContract;

/// Permission level for a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// Execute as soon as the model asks for it.
    Allow,
    /// Wait for a human approval before executing.
    Ask,
    /// Never offered to the model.
    Deny,
}

/// Configuration for the permission system.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PermissionConfig {
    /// Per-tool permissions: tool_name -> Permission
    #[serde(default)]
    pub tools: HashMap<String, Permission>,
}

impl PermissionConfig {
    /// Returns the configured permission for a tool, if any.
    pub fn get(&self, tool_name: &str) -> Option<Permission> {
        self.tools.get(tool_name).copied()
    }

    /// Applies the configured permission to a contract.
    ///
    /// Returns `None` for denied tools. Tools without an executor cannot be
    /// switched to `allow`, since nothing could produce their result; they
    /// keep requiring confirmation.
    pub fn apply(&self, mut contract: ToolContract) -> Option<ToolContract> {
        match self.get(&contract.name) {
            None => Some(contract),
            Some(Permission::Deny) => None,
            Some(Permission::Ask) => {
                contract.requires_confirmation = true;
                Some(contract)
            }
            Some(Permission::Allow) => {
                if contract.executor.is_some() {
                    contract.requires_confirmation = false;
                } else {
                    tracing::warn!(
                        tool = %contract.name,
                        "tool has no executor and must stay behind confirmation"
                    );
                }
                Some(contract)
            }
        }
    }

    /// Project values win over global values for the same tool.
    pub fn merge(global: PermissionConfig, project: PermissionConfig) -> PermissionConfig {
        let mut tools = global.tools;
        tools.extend(project.tools);
        PermissionConfig { tools }
    }
}
