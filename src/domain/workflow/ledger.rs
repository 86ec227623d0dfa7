//! Per-run output ledger
//!
//! Maps the trigger and every executed step to the text it produced. A ledger
//! lives for exactly one run and is owned by that run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::StepId;

/// Address of a ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKey {
    Trigger,
    Step(StepId),
}

/// Outputs produced during one workflow run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputLedger {
    /// Text produced by the trigger, if it has fired
    #[serde(skip_serializing_if = "Option::is_none")]
    trigger: Option<String>,

    /// Outputs from executed steps, keyed by step id
    #[serde(default)]
    steps: HashMap<StepId, String>,
}

impl OutputLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger seeded with the trigger's output
    pub fn with_trigger(output: impl Into<String>) -> Self {
        Self {
            trigger: Some(output.into()),
            steps: HashMap::new(),
        }
    }

    pub fn trigger(&self) -> Option<&str> {
        self.trigger.as_deref()
    }

    pub fn set_trigger(&mut self, output: impl Into<String>) {
        self.trigger = Some(output.into());
    }

    pub fn step(&self, id: &StepId) -> Option<&str> {
        self.steps.get(id).map(String::as_str)
    }

    /// Look up a step by its raw id text, as found inside a placeholder
    pub fn step_by_str(&self, id: &str) -> Option<&str> {
        self.steps.get(id).map(String::as_str)
    }

    pub fn record_step(&mut self, id: StepId, output: impl Into<String>) {
        self.steps.insert(id, output.into());
    }

    pub fn get(&self, key: &LedgerKey) -> Option<&str> {
        match key {
            LedgerKey::Trigger => self.trigger(),
            LedgerKey::Step(id) => self.step(id),
        }
    }

    pub fn contains(&self, key: &LedgerKey) -> bool {
        self.get(key).is_some()
    }

    pub fn step_outputs(&self) -> &HashMap<StepId, String> {
        &self.steps
    }

    /// Number of entries, counting the trigger when present
    pub fn len(&self) -> usize {
        self.steps.len() + usize::from(self.trigger.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
