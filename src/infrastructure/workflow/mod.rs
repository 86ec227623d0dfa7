//! Workflow infrastructure implementations

mod in_memory_store;
mod runner;
mod step_loop;
mod trigger_classifier;

pub use in_memory_store::InMemoryDefinitionStore;
pub use runner::{
    DispatchOutcome, RunProgress, RunnerConfig, SkipReason, WorkflowRun, WorkflowRunner,
    DEFAULT_MAX_TURNS_PER_STEP,
};
pub use step_loop::{StepExecution, StepState};
pub use trigger_classifier::BackendTriggerClassifier;
