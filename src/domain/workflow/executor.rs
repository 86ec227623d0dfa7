//! Run outcome and result types

use serde::Serialize;
use uuid::Uuid;

use super::ids::{StepId, WorkflowId};
use super::ledger::OutputLedger;
use super::placeholder::ResolutionWarning;
use super::stop_checker::StopDecision;

/// How a workflow run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step ran
    Completed,

    /// A stop-checker halted the run on purpose
    Stopped {
        step_id: StepId,
        #[serde(skip_serializing_if = "Option::is_none")]
        matched: Option<String>,
    },

    /// The caller cancelled the run
    Aborted {
        #[serde(skip_serializing_if = "Option::is_none")]
        step_id: Option<StepId>,
    },

    /// A step failed; the ledger holds everything recorded before it
    Failed {
        reason: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        step_id: Option<StepId>,
    },
}

impl RunOutcome {
    pub fn failed(reason: impl Into<String>, step_id: Option<StepId>) -> Self {
        Self::Failed {
            reason: reason.into(),
            step_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Stopped { .. } => "stopped",
            Self::Aborted { .. } => "aborted",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Status of one step within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Checked,
    Aborted,
    Failed,
}

/// Result of executing a single step
#[derive(Debug, Clone, Serialize)]
pub struct StepExecutionResult {
    pub step_id: StepId,

    pub step_name: String,

    pub status: StepStatus,

    /// Output recorded in the ledger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Stop-checker verdict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<StopDecision>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Backend turns taken
    pub turns: usize,

    /// Placeholder misses met while resolving the template
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ResolutionWarning>,

    pub execution_time_ms: u64,
}

impl StepExecutionResult {
    fn base(step_id: StepId, step_name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step_id,
            step_name: step_name.into(),
            status,
            output: None,
            decision: None,
            error: None,
            turns: 0,
            warnings: Vec::new(),
            execution_time_ms: 0,
        }
    }

    pub fn completed(step_id: StepId, step_name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            ..Self::base(step_id, step_name, StepStatus::Completed)
        }
    }

    pub fn checked(step_id: StepId, step_name: impl Into<String>, decision: StopDecision) -> Self {
        Self {
            decision: Some(decision),
            ..Self::base(step_id, step_name, StepStatus::Checked)
        }
    }

    pub fn aborted(step_id: StepId, step_name: impl Into<String>) -> Self {
        Self::base(step_id, step_name, StepStatus::Aborted)
    }

    pub fn failed(step_id: StepId, step_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(step_id, step_name, StepStatus::Failed)
        }
    }

    pub fn with_turns(mut self, turns: usize) -> Self {
        self.turns = turns;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<ResolutionWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_execution_time(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self
    }
}

/// Everything the caller gets back from a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,

    pub workflow_id: WorkflowId,

    pub outcome: RunOutcome,

    /// Final ledger, partial when the run did not complete
    pub ledger: OutputLedger,

    pub step_results: Vec<StepExecutionResult>,

    pub execution_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sid(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }

    #[test]
    fn test_outcome_serialization() {
        let stopped = RunOutcome::Stopped {
            step_id: sid("gate"),
            matched: Some("no results".to_string()),
        };
        let json = serde_json::to_value(&stopped).unwrap();
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["step_id"], "gate");

        let failed = RunOutcome::failed("HTTP 502", None);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "HTTP 502");
        assert!(json.get("step_id").is_none());
        assert!(failed.is_error());
        assert!(!stopped.is_error());
    }

    #[test]
    fn test_step_result_builders() {
        let result = StepExecutionResult::completed(sid("agent"), "Agent", "found 3 emails")
            .with_turns(3)
            .with_execution_time(12);

        assert_eq!(result.status, StepStatus::Completed);
        assert_eq!(result.output.as_deref(), Some("found 3 emails"));
        assert_eq!(result.turns, 3);

        let failed = StepExecutionResult::failed(sid("agent"), "Agent", "boom");
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert!(failed.output.is_none());
    }
}
