//! Tool registry boundary

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
use mockall::automock;

use crate::domain::workflow::ToolId;
use crate::domain::DomainError;

/// A tool an agent step can be given
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: ToolId,

    pub name: String,

    /// Server that hosts the tool
    pub server: String,

    #[serde(default)]
    pub description: String,
}

impl ToolDescriptor {
    pub fn new(id: ToolId, name: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            server: server.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Enumerates the tools available to agent steps
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, DomainError>;

    async fn get_tool(&self, id: &ToolId) -> Result<Option<ToolDescriptor>, DomainError>;
}
