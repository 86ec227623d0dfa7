//! Bundle files: a workflow definition plus the tools its agents may use

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::domain::tool::ToolDescriptor;
use crate::domain::workflow::{DefinitionWarning, WorkflowDefinition};

#[derive(Debug, Clone, Deserialize)]
pub struct Bundle {
    #[serde(flatten)]
    pub definition: WorkflowDefinition,

    /// Tools known to the registry. When empty, agent tools are not checked.
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

impl Bundle {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bundle {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("Invalid bundle {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Agent tools that are missing from the bundle's tool list
    pub fn unknown_tools(&self) -> Vec<String> {
        if self.tools.is_empty() {
            return Vec::new();
        }

        let mut unknown = Vec::new();
        for step in self.definition.steps() {
            let Some(tools) = step.kind().tools() else {
                continue;
            };
            for (id, _) in tools.settings() {
                if !self.tools.iter().any(|t| t.id == id) {
                    unknown.push(format!("{}: {}", step.id(), id));
                }
            }
        }
        unknown
    }

    pub fn warnings(&self) -> Vec<DefinitionWarning> {
        self.definition.lint()
    }
}
