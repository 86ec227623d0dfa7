//! In-memory definition store

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::workflow::{
    DefinitionStore, Step, StepId, Trigger, Workflow, WorkflowDefinition, WorkflowId,
};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Tables {
    workflows: HashMap<WorkflowId, Workflow>,
    steps: HashMap<WorkflowId, HashMap<StepId, Step>>,
    triggers: HashMap<WorkflowId, Trigger>,
}

/// In-memory implementation of DefinitionStore
#[derive(Debug, Clone, Default)]
pub struct InMemoryDefinitionStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryDefinitionStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given definitions
    pub fn with_definitions(definitions: impl IntoIterator<Item = WorkflowDefinition>) -> Self {
        let mut tables = Tables::default();

        for definition in definitions {
            let id = definition.workflow().id().clone();
            let steps = definition
                .steps()
                .iter()
                .map(|s| (s.id().clone(), s.clone()))
                .collect();

            tables.steps.insert(id.clone(), steps);
            if let Some(trigger) = definition.trigger() {
                tables.triggers.insert(id.clone(), trigger.clone());
            }
            tables.workflows.insert(id, definition.workflow().clone());
        }

        Self {
            tables: Arc::new(RwLock::new(tables)),
        }
    }
}

#[async_trait]
impl DefinitionStore for InMemoryDefinitionStore {
    async fn get_workflow(&self, id: &WorkflowId) -> Result<Option<Workflow>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables.workflows.get(id).cloned())
    }

    async fn list_workflows(&self) -> Result<Vec<Workflow>, DomainError> {
        let tables = self.tables.read().await;
        let mut workflows: Vec<Workflow> = tables.workflows.values().cloned().collect();
        workflows.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(workflows)
    }

    async fn create_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
        let mut tables = self.tables.write().await;

        if tables.workflows.contains_key(workflow.id()) {
            return Err(DomainError::conflict(format!(
                "Workflow '{}' already exists",
                workflow.id()
            )));
        }

        tables.workflows.insert(workflow.id().clone(), workflow.clone());
        Ok(workflow)
    }

    async fn update_workflow(&self, workflow: Workflow) -> Result<Workflow, DomainError> {
        let mut tables = self.tables.write().await;

        if !tables.workflows.contains_key(workflow.id()) {
            return Err(DomainError::not_found(format!(
                "Workflow '{}' not found",
                workflow.id()
            )));
        }

        tables.workflows.insert(workflow.id().clone(), workflow.clone());
        Ok(workflow)
    }

    async fn delete_workflow(&self, id: &WorkflowId) -> Result<bool, DomainError> {
        let mut tables = self.tables.write().await;
        tables.steps.remove(id);
        tables.triggers.remove(id);
        Ok(tables.workflows.remove(id).is_some())
    }

    async fn get_steps(&self, workflow_id: &WorkflowId) -> Result<Vec<Step>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .steps
            .get(workflow_id)
            .map(|steps| steps.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_step(
        &self,
        workflow_id: &WorkflowId,
        id: &StepId,
    ) -> Result<Option<Step>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables
            .steps
            .get(workflow_id)
            .and_then(|steps| steps.get(id))
            .cloned())
    }

    async fn create_step(&self, step: Step) -> Result<Step, DomainError> {
        let mut tables = self.tables.write().await;

        if !tables.workflows.contains_key(step.workflow_id()) {
            return Err(DomainError::not_found(format!(
                "Workflow '{}' not found",
                step.workflow_id()
            )));
        }

        let steps = tables.steps.entry(step.workflow_id().clone()).or_default();
        if steps.contains_key(step.id()) {
            return Err(DomainError::conflict(format!(
                "Step '{}' already exists",
                step.id()
            )));
        }

        steps.insert(step.id().clone(), step.clone());
        Ok(step)
    }

    async fn update_step(&self, step: Step) -> Result<Step, DomainError> {
        let mut tables = self.tables.write().await;

        let slot = tables
            .steps
            .get_mut(step.workflow_id())
            .and_then(|steps| steps.get_mut(step.id()))
            .ok_or_else(|| DomainError::not_found(format!("Step '{}' not found", step.id())))?;

        *slot = step.clone();
        Ok(step)
    }

    async fn delete_step(&self, workflow_id: &WorkflowId, id: &StepId) -> Result<bool, DomainError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .steps
            .get_mut(workflow_id)
            .and_then(|steps| steps.remove(id))
            .is_some())
    }

    async fn get_trigger(&self, workflow_id: &WorkflowId) -> Result<Option<Trigger>, DomainError> {
        let tables = self.tables.read().await;
        Ok(tables.triggers.get(workflow_id).cloned())
    }

    async fn put_trigger(&self, trigger: Trigger) -> Result<Trigger, DomainError> {
        let mut tables = self.tables.write().await;

        if !tables.workflows.contains_key(trigger.workflow_id()) {
            return Err(DomainError::not_found(format!(
                "Workflow '{}' not found",
                trigger.workflow_id()
            )));
        }

        tables
            .triggers
            .insert(trigger.workflow_id().clone(), trigger.clone());
        Ok(trigger)
    }

    async fn delete_trigger(&self, workflow_id: &WorkflowId) -> Result<bool, DomainError> {
        let mut tables = self.tables.write().await;
        Ok(tables.triggers.remove(workflow_id).is_some())
    }
}
