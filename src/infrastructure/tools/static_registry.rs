use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::tool::{ToolDescriptor, ToolRegistry};
use crate::domain::workflow::ToolId;
use crate::domain::DomainError;

/// Registry over a fixed list of tools
#[derive(Debug, Clone, Default)]
pub struct StaticToolRegistry {
    tools: BTreeMap<ToolId, ToolDescriptor>,
}

impl StaticToolRegistry {
    pub fn new(tools: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        Self {
            tools: tools.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    /// Display name for a tool, if registered
    pub fn name_of(&self, id: &ToolId) -> Option<String> {
        self.tools.get(id).map(|t| t.name.clone())
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, DomainError> {
        Ok(self.tools.values().cloned().collect())
    }

    async fn get_tool(&self, id: &ToolId) -> Result<Option<ToolDescriptor>, DomainError> {
        Ok(self.tools.get(id).cloned())
    }
}
