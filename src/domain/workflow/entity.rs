//! Workflow and step entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::WorkflowError;
use super::ids::{StepId, TriggerId, WorkflowId};
use super::step_types::StepKind;

/// A step within a workflow
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Step {
    id: StepId,

    /// Owning workflow
    workflow_id: WorkflowId,

    /// Display name
    name: String,

    /// The step type and configuration
    #[serde(flatten)]
    kind: StepKind,
}

impl Step {
    pub fn new(
        id: StepId,
        workflow_id: WorkflowId,
        name: impl Into<String>,
        kind: StepKind,
    ) -> Self {
        Self {
            id,
            workflow_id,
            name: name.into(),
            kind,
        }
    }

    pub fn id(&self) -> &StepId {
        &self.id
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut StepKind {
        &mut self.kind
    }

    pub fn template(&self) -> Option<&str> {
        self.kind.template()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Replace the prompt template. Stop-checkers have none.
    pub fn set_template(&mut self, template: impl Into<String>) -> Result<(), WorkflowError> {
        match &mut self.kind {
            StepKind::LanguageModel(step) => step.system_prompt = template.into(),
            StepKind::Agent(step) => step.system_prompt = template.into(),
            StepKind::StopChecker(_) => {
                return Err(WorkflowError::validation(format!(
                    "Step '{}' is a stop checker and has no template",
                    self.id
                )));
            }
        }
        Ok(())
    }
}

/// A workflow definition: ordered step ids plus at most one trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow identifier
    id: WorkflowId,

    /// Human-readable name
    name: String,

    /// Optional description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    /// Whether the trigger may launch runs
    #[serde(default = "default_active")]
    active: bool,

    /// Step ids in execution order
    #[serde(default)]
    steps: Vec<StepId>,

    /// The workflow's trigger, if one is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trigger_id: Option<TriggerId>,

    /// Configuration version (increments on structural changes)
    #[serde(default = "default_version")]
    version: u32,

    #[serde(default = "Utc::now")]
    created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

fn default_version() -> u32 {
    1
}

impl Workflow {
    /// Create a new, active workflow with no steps
    pub fn new(id: WorkflowId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: name.into(),
            description: None,
            active: true,
            steps: Vec::new(),
            trigger_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    // Builder methods

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    // Getters

    pub fn id(&self) -> &WorkflowId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn step_ids(&self) -> &[StepId] {
        &self.steps
    }

    pub fn trigger_id(&self) -> Option<&TriggerId> {
        self.trigger_id.as_ref()
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn position_of(&self, id: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| s == id)
    }

    // Mutations

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.touch();
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
        self.touch();
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.touch();
    }

    /// Insert a step at `position` (appended when `None` or past the end)
    pub fn insert_step(&mut self, id: StepId, position: Option<usize>) -> Result<usize, WorkflowError> {
        if self.steps.contains(&id) {
            return Err(WorkflowError::duplicate_step(id.as_str()));
        }

        let index = position.unwrap_or(self.steps.len()).min(self.steps.len());
        self.steps.insert(index, id);
        self.increment_version();
        Ok(index)
    }

    /// Remove a step from the order. Later steps move up by one.
    pub fn remove_step(&mut self, id: &StepId) -> bool {
        match self.position_of(id) {
            Some(index) => {
                self.steps.remove(index);
                self.increment_version();
                true
            }
            None => false,
        }
    }

    /// Move a step to a new index, shifting the ones in between
    pub fn move_step(&mut self, id: &StepId, index: usize) -> Result<(), WorkflowError> {
        let from = self
            .position_of(id)
            .ok_or_else(|| WorkflowError::step_not_found(id.as_str()))?;

        if index >= self.steps.len() {
            return Err(WorkflowError::validation(format!(
                "Step index {} out of range for {} steps",
                index,
                self.steps.len()
            )));
        }

        let step = self.steps.remove(from);
        self.steps.insert(index, step);
        self.increment_version();
        Ok(())
    }

    pub fn set_trigger(&mut self, id: TriggerId) {
        self.trigger_id = Some(id);
        self.increment_version();
    }

    pub fn clear_trigger(&mut self) -> Option<TriggerId> {
        let previous = self.trigger_id.take();
        if previous.is_some() {
            self.increment_version();
        }
        previous
    }

    /// Check the step order has no duplicate entries
    pub fn validate(&self) -> Result<(), WorkflowError> {
        for (index, id) in self.steps.iter().enumerate() {
            if self.steps[..index].contains(id) {
                return Err(WorkflowError::duplicate_step(id.as_str()));
            }
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn increment_version(&mut self) {
        self.version += 1;
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::step_types::{CheckMode, LanguageModelStep, StepReference, StopCheckerStep};

    fn wf() -> Workflow {
        Workflow::new(WorkflowId::new("triage").unwrap(), "Triage")
    }

    fn sid(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }

    #[test]
    fn test_workflow_creation() {
        let workflow = wf().with_description("Sorts inbound mail");

        assert_eq!(workflow.id().as_str(), "triage");
        assert_eq!(workflow.name(), "Triage");
        assert_eq!(workflow.description(), Some("Sorts inbound mail"));
        assert!(workflow.is_active());
        assert_eq!(workflow.version(), 1);
        assert_eq!(workflow.step_count(), 0);
        assert!(workflow.trigger_id().is_none());
    }

    #[test]
    fn test_insert_and_reorder_steps() {
        let mut workflow = wf();
        workflow.insert_step(sid("a"), None).unwrap();
        workflow.insert_step(sid("c"), None).unwrap();
        assert_eq!(workflow.insert_step(sid("b"), Some(1)).unwrap(), 1);
        assert_eq!(workflow.step_ids(), &[sid("a"), sid("b"), sid("c")]);

        workflow.move_step(&sid("c"), 0).unwrap();
        assert_eq!(workflow.step_ids(), &[sid("c"), sid("a"), sid("b")]);

        assert!(workflow.move_step(&sid("c"), 3).is_err());
        assert!(workflow.move_step(&sid("zz"), 0).is_err());
        assert_eq!(workflow.version(), 5);
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut workflow = wf();
        workflow.insert_step(sid("a"), None).unwrap();
        let err = workflow.insert_step(sid("a"), Some(0)).unwrap_err();
        assert_eq!(err, WorkflowError::duplicate_step("a"));
    }

    #[test]
    fn test_insert_position_clamped() {
        let mut workflow = wf();
        assert_eq!(workflow.insert_step(sid("a"), Some(10)).unwrap(), 0);
    }

    #[test]
    fn test_remove_step() {
        let mut workflow = wf();
        workflow.insert_step(sid("a"), None).unwrap();
        workflow.insert_step(sid("b"), None).unwrap();

        assert!(workflow.remove_step(&sid("a")));
        assert!(!workflow.remove_step(&sid("a")));
        assert_eq!(workflow.position_of(&sid("b")), Some(0));
    }

    #[test]
    fn test_trigger_slot() {
        let mut workflow = wf();
        workflow.set_trigger(TriggerId::new("t1").unwrap());
        workflow.set_trigger(TriggerId::new("t2").unwrap());
        assert_eq!(workflow.trigger_id().unwrap().as_str(), "t2");

        assert_eq!(workflow.clear_trigger().unwrap().as_str(), "t2");
        assert!(workflow.clear_trigger().is_none());
    }

    #[test]
    fn test_validate_rejects_duplicates_from_wire() {
        let json = r#"{"id":"w","name":"W","steps":["a","b","a"]}"#;
        let workflow: Workflow = serde_json::from_str(json).unwrap();
        assert_eq!(workflow.validate().unwrap_err(), WorkflowError::duplicate_step("a"));
    }

    #[test]
    fn test_step_template_editing() {
        let mut step = Step::new(
            sid("summary"),
            WorkflowId::new("triage").unwrap(),
            "Summary",
            StepKind::LanguageModel(LanguageModelStep::new("gpt-4o", "old")),
        );
        step.set_template("new <<trigger_output>>").unwrap();
        assert_eq!(step.template(), Some("new <<trigger_output>>"));

        let mut checker = Step::new(
            sid("gate"),
            WorkflowId::new("triage").unwrap(),
            "Gate",
            StepKind::StopChecker(StopCheckerStep::new(StepReference::Trigger, CheckMode::StopIfContains)),
        );
        assert!(checker.set_template("x").is_err());
    }

    #[test]
    fn test_step_serialization_flattens_kind() {
        let step = Step::new(
            sid("summary"),
            WorkflowId::new("triage").unwrap(),
            "Summary",
            StepKind::LanguageModel(LanguageModelStep::new("gpt-4o", "Summarize")),
        );

        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["id"], "summary");
        assert_eq!(json["type"], "language_model");
        assert_eq!(json["system_prompt"], "Summarize");

        let back: Step = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }
}
