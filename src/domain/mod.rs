//! Domain layer - workflow definitions, execution results and the traits
//! adapters implement

pub mod error;
pub mod llm;
pub mod tool;
pub mod workflow;

pub use error::DomainError;
pub use tool::{ToolDescriptor, ToolRegistry};
