//! A workflow together with its trigger and steps, validated as a unit

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::{Step, Workflow};
use super::error::WorkflowError;
use super::ids::StepId;
use super::placeholder::{extract_placeholders, Placeholder};
use super::step_types::{StepKind, StepReference};
use super::trigger::Trigger;

/// Workflow, trigger and steps loaded for execution.
///
/// `steps` is always in the workflow's step order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "DefinitionParts")]
pub struct WorkflowDefinition {
    workflow: Workflow,

    #[serde(skip_serializing_if = "Option::is_none")]
    trigger: Option<Trigger>,

    steps: Vec<Step>,
}

#[derive(Deserialize)]
struct DefinitionParts {
    workflow: Workflow,
    #[serde(default)]
    trigger: Option<Trigger>,
    #[serde(default)]
    steps: Vec<Step>,
}

impl TryFrom<DefinitionParts> for WorkflowDefinition {
    type Error = WorkflowError;

    fn try_from(parts: DefinitionParts) -> Result<Self, Self::Error> {
        Self::new(parts.workflow, parts.trigger, parts.steps)
    }
}

/// Non-fatal definition problems, shown to whoever edits the workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DefinitionWarning {
    /// `<<trigger_output>>` used in a workflow without a trigger
    TriggerOutputWithoutTrigger { step: StepId },

    /// `<<step_output.X>>` where X is not a step of this workflow
    UnknownStepReference { step: StepId, reference: String },

    /// `<<step_output.X>>` where X runs at or after the referencing step
    ForwardStepReference { step: StepId, reference: String },

    /// A stop-checker whose target is gone or runs later
    DanglingStopCheck { step: StepId, reference: String },

    /// A stop-checker inspecting the trigger of a workflow without one
    StopCheckWithoutTrigger { step: StepId },
}

impl fmt::Display for DefinitionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerOutputWithoutTrigger { step } => write!(
                f,
                "step '{}' uses <<trigger_output>> but the workflow has no trigger",
                step
            ),
            Self::UnknownStepReference { step, reference } => write!(
                f,
                "step '{}' references unknown step '{}' (resolves to empty text)",
                step, reference
            ),
            Self::ForwardStepReference { step, reference } => write!(
                f,
                "step '{}' references step '{}' which has not run yet at that point",
                step, reference
            ),
            Self::DanglingStopCheck { step, reference } => write!(
                f,
                "stop checker '{}' inspects '{}' which is not an earlier step (reads as empty)",
                step, reference
            ),
            Self::StopCheckWithoutTrigger { step } => write!(
                f,
                "stop checker '{}' inspects the trigger but the workflow has no trigger",
                step
            ),
        }
    }
}

impl WorkflowDefinition {
    /// Assemble a definition, ordering `steps` by the workflow's step list.
    ///
    /// Rejects duplicate positions, steps missing from (or extra to) the order,
    /// steps or triggers owned by another workflow, and a trigger that does not
    /// match the workflow's trigger slot.
    pub fn new(
        workflow: Workflow,
        trigger: Option<Trigger>,
        steps: Vec<Step>,
    ) -> Result<Self, WorkflowError> {
        workflow.validate()?;

        match (workflow.trigger_id(), &trigger) {
            (Some(expected), Some(trigger)) if trigger.id() != expected => {
                return Err(WorkflowError::dangling_reference(format!(
                    "workflow '{}' expects trigger '{}' but got '{}'",
                    workflow.id(),
                    expected,
                    trigger.id()
                )));
            }
            (Some(expected), None) => {
                return Err(WorkflowError::dangling_reference(format!(
                    "workflow '{}' references missing trigger '{}'",
                    workflow.id(),
                    expected
                )));
            }
            (None, Some(trigger)) => {
                return Err(WorkflowError::dangling_reference(format!(
                    "trigger '{}' is not attached to workflow '{}'",
                    trigger.id(),
                    workflow.id()
                )));
            }
            _ => {}
        }

        if let Some(trigger) = &trigger {
            if trigger.workflow_id() != workflow.id() {
                return Err(WorkflowError::validation(format!(
                    "trigger '{}' belongs to workflow '{}'",
                    trigger.id(),
                    trigger.workflow_id()
                )));
            }
        }

        let mut by_id: HashMap<StepId, Step> = HashMap::with_capacity(steps.len());
        for step in steps {
            if step.workflow_id() != workflow.id() {
                return Err(WorkflowError::validation(format!(
                    "step '{}' belongs to workflow '{}'",
                    step.id(),
                    step.workflow_id()
                )));
            }
            if by_id.contains_key(step.id()) {
                return Err(WorkflowError::duplicate_step(step.id().as_str()));
            }
            by_id.insert(step.id().clone(), step);
        }

        let mut ordered = Vec::with_capacity(workflow.step_count());
        for id in workflow.step_ids() {
            let step = by_id
                .remove(id)
                .ok_or_else(|| WorkflowError::step_not_found(id.as_str()))?;
            ordered.push(step);
        }

        if let Some(extra) = by_id.keys().next() {
            return Err(WorkflowError::validation(format!(
                "step '{}' is not in the order of workflow '{}'",
                extra,
                workflow.id()
            )));
        }

        Ok(Self {
            workflow,
            trigger,
            steps: ordered,
        })
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn trigger(&self) -> Option<&Trigger> {
        self.trigger.as_ref()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| s.id() == id)
    }

    /// Collect placeholder and stop-checker warnings across all steps
    pub fn lint(&self) -> Vec<DefinitionWarning> {
        let position: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| (step.id().as_str(), index))
            .collect();

        let mut warnings = Vec::new();

        for (index, step) in self.steps.iter().enumerate() {
            match step.kind() {
                StepKind::StopChecker(checker) => match &checker.step_to_check {
                    StepReference::Trigger if self.trigger.is_none() => {
                        warnings.push(DefinitionWarning::StopCheckWithoutTrigger {
                            step: step.id().clone(),
                        });
                    }
                    StepReference::Step(target)
                        if position.get(target.as_str()).is_none_or(|p| *p >= index) =>
                    {
                        warnings.push(DefinitionWarning::DanglingStopCheck {
                            step: step.id().clone(),
                            reference: target.to_string(),
                        });
                    }
                    _ => {}
                },
                kind => {
                    let template = kind.template().unwrap_or_default();
                    warnings.extend(self.template_warnings_at(step.id(), index, template, &position));
                }
            }
        }

        warnings
    }

    /// Warnings for a template as if it belonged to the step at `index`
    pub fn template_warnings(&self, step: &StepId, template: &str) -> Vec<DefinitionWarning> {
        let position: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(index, step)| (step.id().as_str(), index))
            .collect();
        let index = position
            .get(step.as_str())
            .copied()
            .unwrap_or(self.steps.len());

        self.template_warnings_at(step, index, template, &position)
    }

    fn template_warnings_at(
        &self,
        step: &StepId,
        index: usize,
        template: &str,
        position: &HashMap<&str, usize>,
    ) -> Vec<DefinitionWarning> {
        let mut warnings = Vec::new();

        for placeholder in extract_placeholders(template) {
            match placeholder {
                Placeholder::TriggerOutput if self.trigger.is_none() => {
                    warnings.push(DefinitionWarning::TriggerOutputWithoutTrigger {
                        step: step.clone(),
                    });
                }
                Placeholder::StepOutput(reference) => match position.get(reference.as_str()) {
                    None => warnings.push(DefinitionWarning::UnknownStepReference {
                        step: step.clone(),
                        reference,
                    }),
                    Some(p) if *p >= index => {
                        warnings.push(DefinitionWarning::ForwardStepReference {
                            step: step.clone(),
                            reference,
                        })
                    }
                    Some(_) => {}
                },
                _ => {}
            }
        }

        warnings
    }
}
