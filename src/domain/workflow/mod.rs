//! Workflow domain module
//!
//! A workflow is a trigger plus an ordered chain of steps. Each run keeps an
//! output ledger mapping the trigger and every executed step to the text it
//! produced; later steps read earlier outputs through placeholders.
//!
//! ## Placeholders
//!
//! - `<<trigger_output>>` - output of the trigger
//! - `<<step_output.{step_id}>>` - output of an earlier step
//! - `<<CURRENT_DATE.{tz}>>` - current date in an IANA timezone

mod definition;
mod entity;
mod error;
mod executor;
mod ids;
mod ledger;
pub mod placeholder;
pub mod repository;
mod step_types;
pub mod stop_checker;
mod tools;
mod trigger;

pub use definition::{DefinitionWarning, WorkflowDefinition};
pub use entity::{Step, Workflow};
pub use error::WorkflowError;
pub use executor::{RunOutcome, RunReport, StepExecutionResult, StepStatus};
pub use ids::{validate_id, StepId, ToolId, TriggerId, WorkflowId, MAX_ID_LENGTH};
pub use ledger::{LedgerKey, OutputLedger};
pub use placeholder::{Clock, FixedClock, Placeholder, Resolution, ResolutionWarning, SystemClock};
pub use repository::DefinitionStore;
pub use step_types::{
    AgentStep, CheckMode, LanguageModelStep, StepKind, StepReference, StopCheckerStep,
};
pub use stop_checker::StopDecision;
pub use tools::{ToolConstraintError, ToolConstraints, ToolEntry, ToolSetting, ToolStatus};
pub use trigger::{InboundEvent, ListFilter, Trigger, TriggerClassifier, TriggerFilter};

#[cfg(test)]
pub use trigger::MockTriggerClassifier;
