//! Workflow error types

use thiserror::Error;

use super::tools::ToolConstraintError;
use crate::domain::DomainError;

/// Errors that can occur during workflow operations
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(String),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Duplicate step '{0}' in workflow order")]
    DuplicateStep(String),

    #[error("Dangling reference: {0}")]
    DanglingReference(String),

    #[error("Tool constraint violated in step '{step}': {source}")]
    ToolConstraint {
        step: String,
        #[source]
        source: ToolConstraintError,
    },

    #[error("Step '{0}' cannot be executed by the step loop")]
    NotExecutable(String),

    #[error("No human input pending for tool call '{0}'")]
    HumanInputMismatch(String),

    #[error("Store error: {0}")]
    Store(#[from] DomainError),
}

impl WorkflowError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn step_not_found(id: impl Into<String>) -> Self {
        Self::StepNotFound(id.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn duplicate_step(id: impl Into<String>) -> Self {
        Self::DuplicateStep(id.into())
    }

    pub fn dangling_reference(message: impl Into<String>) -> Self {
        Self::DanglingReference(message.into())
    }

    pub fn tool_constraint(step: impl Into<String>, source: ToolConstraintError) -> Self {
        Self::ToolConstraint {
            step: step.into(),
            source,
        }
    }

    pub fn not_executable(step: impl Into<String>) -> Self {
        Self::NotExecutable(step.into())
    }

    pub fn human_input_mismatch(tool_call_id: impl Into<String>) -> Self {
        Self::HumanInputMismatch(tool_call_id.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WorkflowError::not_found("triage");
        assert_eq!(err.to_string(), "Workflow not found: triage");

        let err = WorkflowError::duplicate_step("summarize");
        assert_eq!(
            err.to_string(),
            "Duplicate step 'summarize' in workflow order"
        );

        let err = WorkflowError::tool_constraint(
            "agent",
            ToolConstraintError::DuplicateOrder {
                order: 1,
                tool: "send".to_string(),
            },
        );
        assert!(err.to_string().starts_with("Tool constraint violated in step 'agent'"));
    }

    #[test]
    fn test_store_error_conversion() {
        let err: WorkflowError = DomainError::storage("disk full").into();
        assert_eq!(err.to_string(), "Store error: Storage error: disk full");
    }

    #[test]
    fn test_error_equality() {
        let err1 = WorkflowError::step_not_found("a");
        let err2 = WorkflowError::step_not_found("a");
        assert_eq!(err1, err2);
        assert_ne!(err1, WorkflowError::step_not_found("b"));
    }
}
