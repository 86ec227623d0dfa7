//! Step backend domain models and traits

mod backend;
mod message;

pub use backend::{HumanInputRequest, StepBackend, StepContext, TurnResponse};
pub use message::{Message, MessageRole, ToolCall};

#[cfg(test)]
pub use backend::mock::{MockStepBackend, RecordedTurn};
