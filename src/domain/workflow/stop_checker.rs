//! Stop-condition evaluation

use serde::Serialize;

use super::ledger::OutputLedger;
use super::step_types::{CheckMode, StopCheckerStep};

/// Result of evaluating a stop-checker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopDecision {
    pub halt: bool,

    /// First match value found in the inspected text, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
}

/// Decide whether the run should halt at this stop-checker.
///
/// A missing ledger entry (step not run, or deleted) is read as empty text.
/// With no match values `stop_if_contains` never halts and
/// `continue_if_contains` always halts.
pub fn evaluate(step: &StopCheckerStep, ledger: &OutputLedger) -> StopDecision {
    let text = ledger
        .get(&step.step_to_check.ledger_key())
        .unwrap_or_default()
        .to_lowercase();

    let matched = step
        .match_values
        .iter()
        .find(|value| text.contains(&value.to_lowercase()))
        .cloned();

    let halt = match step.check_mode {
        CheckMode::StopIfContains => matched.is_some(),
        CheckMode::ContinueIfContains => matched.is_none(),
    };

    StopDecision { halt, matched }
}
