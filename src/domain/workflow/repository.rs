//! Definition store trait

use async_trait::async_trait;

use super::entity::{Step, Workflow};
use super::ids::{StepId, WorkflowId};
use super::trigger::Trigger;
use crate::domain::DomainError;

/// Persistence boundary for workflows, their steps and triggers.
///
/// Implementations store what they are given. Invariant checks happen in
/// `DefinitionService` before any write reaches the store.
#[async_trait]
pub trait DefinitionStore: Send + Sync + std::fmt::Debug {
    /// Get a workflow by ID
    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>, DomainError>;

    /// List all workflows
    async fn list_workflows(&self) -> Result<Vec<Workflow>, DomainError>;

    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError>;

    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError>;

    /// Delete a workflow together with its steps and trigger
    async fn delete_workflow(&self, id: &WorkflowId) -> Result<bool, DomainError>;

    /// All steps owned by a workflow, in no particular order
    async fn get_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<Step>, DomainError>;

    async fn get_step(
        &self,
        workflow_id: &WorkflowId,
        id: &StepId,
    ) -> Result<Option<Step>, DomainError>;

    async fn create_step(&self, step: Step) -> Result<Step, DomainError>;

    async fn update_step(&self, step: Step) -> Result<Step, DomainError>;

    async fn delete_step(&self, workflow_id: &WorkflowId, id: &StepId) -> Result<bool, DomainError>;

    /// The trigger attached to a workflow, if any
    async fn get_trigger(&self, workflow_id: &WorkflowId) -> Result<Option<Trigger>, DomainError>;

    /// Store a trigger, replacing whatever the workflow had before
    async fn put_trigger(&self, trigger: Trigger) -> Result<Trigger, DomainError>;

    async fn delete_trigger(&self, workflow_id: &WorkflowId) -> Result<bool, DomainError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Mock definition store for testing
    #[derive(Debug, Default)]
    pub struct MockDefinitionStore {
        workflows: Mutex<HashMap<WorkflowId, Workflow>>,
        steps: Mutex<HashMap<(WorkflowId, StepId), Step>>,
        triggers: Mutex<HashMap<WorkflowId, Trigger>>,
        should_fail: Mutex<Option<String>>,
    }

    impl MockDefinitionStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_workflow(self, workflow: Workflow) -> Self {
            self.workflows
                .lock()
                .unwrap()
                .insert(workflow.id().clone(), workflow);
            self
        }

        pub fn with_step(self, step: Step) -> Self {
            self.steps
                .lock()
                .unwrap()
                .insert((step.workflow_id().clone(), step.id().clone()), step);
            self
        }

        pub fn with_trigger(self, trigger: Trigger) -> Self {
            self.triggers
                .lock()
                .unwrap()
                .insert(trigger.workflow_id().clone(), trigger);
            self
        }

        pub fn with_error(self, error: impl Into<String>) -> Self {
            *self.should_fail.lock().unwrap() = Some(error.into());
            self
        }

        fn check_error(&self) -> Result<(), DomainError> {
            if let Some(ref msg) = *self.should_fail.lock().unwrap() {
                return Err(DomainError::storage(msg.clone()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl DefinitionStore for MockDefinitionStore {
        async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>, DomainError> {
            self.check_error()?;
            Ok(self.workflows.lock().unwrap().get(id).cloned())
        }

        async fn list_workflows(&self) -> Result<Vec<Workflow>, DomainError> {
            self.check_error()?;
            Ok(self.workflows.lock().unwrap().values().cloned().collect())
        }

        async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
            self.check_error()?;
            let mut workflows = self.workflows.lock().unwrap();
            if workflows.contains_key(workflow.id()) {
                return Err(DomainError::conflict(format!(
                    "Workflow '{}' already exists",
                    workflow.id()
                )));
            }
            workflows.insert(workflow.id().clone(), workflow.clone());
            Ok(workflow)
        }

        async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
            self.check_error()?;
            let mut workflows = self.workflows.lock().unwrap();
            if !workflows.contains_key(workflow.id()) {
                return Err(DomainError::not_found(format!(
                    "Workflow '{}' not found",
                    workflow.id()
                )));
            }
            workflows.insert(workflow.id().clone(), workflow.clone());
            Ok(workflow)
        }

        async fn delete_workflow(&self, id: &WorkflowId) -> Result<bool, DomainError> {
            self.check_error()?;
            self.steps.lock().unwrap().retain(|(wf, _), _| wf != id);
            self.triggers.lock().unwrap().remove(id);
            Ok(self.workflows.lock().unwrap().remove(id).is_some())
        }

        async fn get_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<Step>, DomainError> {
            self.check_error()?;
            Ok(self
                .steps
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.workflow_id() == workflow_id)
                .cloned()
                .collect())
        }

        async fn get_step(
            &self,
            workflow_id: &WorkflowId,
            id: &StepId,
        ) -> Result<Option<Step>, DomainError> {
            self.check_error()?;
            Ok(self
                .steps
                .lock()
                .unwrap()
                .get(&(workflow_id.clone(), id.clone()))
                .cloned())
        }

        async fn create_step(&self, step: Step) -> Result<Step, DomainError> {
            self.check_error()?;
            let key = (step.workflow_id().clone(), step.id().clone());
            let mut steps = self.steps.lock().unwrap();
            if steps.contains_key(&key) {
                return Err(DomainError::conflict(format!("Step '{}' already exists", step.id())));
            }
            steps.insert(key, step.clone());
            Ok(step)
        }

        async fn update_step(&self, step: Step) -> Result<Step, DomainError> {
            self.check_error()?;
            let key = (step.workflow_id().clone(), step.id().clone());
            let mut steps = self.steps.lock().unwrap();
            if !steps.contains_key(&key) {
                return Err(DomainError::not_found(format!("Step '{}' not found", step.id())));
            }
            steps.insert(key, step.clone());
            Ok(step)
        }

        async fn delete_step(&self, workflow_id: &WorkflowId, id: &StepId) -> Result<bool, DomainError> {
            self.check_error()?;
            Ok(self
                .steps
                .lock()
                .unwrap()
                .remove(&(workflow_id.clone(), id.clone()))
                .is_some())
        }

        async fn get_trigger(&self, workflow_id: &WorkflowId) -> Result<Option<Trigger>, DomainError> {
            self.check_error()?;
            Ok(self.triggers.lock().unwrap().get(workflow_id).cloned())
        }

        async fn put_trigger(&self, trigger: Trigger) -> Result<Trigger, DomainError> {
            self.check_error()?;
            self.triggers
                .lock()
                .unwrap()
                .insert(trigger.workflow_id().clone(), trigger.clone());
            Ok(trigger)
        }

        async fn delete_trigger(&self, workflow_id: &WorkflowId) -> Result<bool, DomainError> {
            self.check_error()?;
            Ok(self.triggers.lock().unwrap().remove(workflow_id).is_some())
        }
    }
}
