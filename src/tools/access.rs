//! Tool access control: read-only mode and disabled tools.
//!
//! Checked by the dispatcher after lookup and before validation, so a denied
//! call never reaches the cluster.

use std::collections::HashSet;

use super::registry::ToolDescriptor;
use crate::types::{AccessConfig, Error, Result};

/// Process-wide tool access policy.
#[derive(Debug, Default, Clone)]
pub struct ToolAccessPolicy {
    read_only: bool,
    disabled: HashSet<String>,
}

impl ToolAccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            read_only: config.read_only,
            disabled: config.disabled_tools.iter().cloned().collect(),
        }
    }

    /// Enable or disable read-only mode.
    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Never dispatch the named tool.
    pub fn disable(&mut self, tool: &str) {
        self.disabled.insert(tool.to_string());
    }

    /// Re-enable a previously disabled tool.
    pub fn enable(&mut self, tool: &str) {
        self.disabled.remove(tool);
    }

    /// Whether the tool may be dispatched.
    pub fn permits(&self, descriptor: &ToolDescriptor) -> bool {
        self.check(descriptor).is_ok()
    }

    /// Reject the tool with `Forbidden` if the policy does not allow it.
    pub fn check(&self, descriptor: &ToolDescriptor) -> Result<()> {
        if self.disabled.contains(&descriptor.name) {
            return Err(Error::forbidden(format!(
                "tool '{}' is disabled",
                descriptor.name
            )));
        }
        if self.read_only && descriptor.risk.is_mutating() {
            return Err(Error::forbidden(format!(
                "tool '{}' modifies the cluster and the server is read-only",
                descriptor.name
            )));
        }
        Ok(())
    }

    /// Names of disabled tools, sorted.
    pub fn disabled_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.disabled.iter().cloned().collect();
        names.sort();
        names
    }
}
