//! Definition service - the validating write path for workflows, steps and
//! triggers

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::tool::ToolRegistry;
use crate::domain::workflow::{
    DefinitionStore, DefinitionWarning, Step, StepId, StepKind, StepReference, StopCheckerStep,
    ToolConstraintError, ToolConstraints, ToolEntry, ToolId, Trigger, TriggerFilter, TriggerId, Workflow,
    WorkflowDefinition, WorkflowError, WorkflowId,
};

/// Request to create a new workflow
#[derive(Debug, Clone)]
pub struct CreateWorkflowRequest {
    /// Generated when absent
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub active: bool,
}

impl CreateWorkflowRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            description: None,
            active: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }
}

/// Request to add a step to a workflow
#[derive(Debug, Clone)]
pub struct AddStepRequest {
    /// Generated when absent
    pub id: Option<String>,
    pub name: String,
    pub kind: StepKind,
    /// Index to insert at; appended when absent
    pub position: Option<usize>,
}

impl AddStepRequest {
    pub fn new(name: impl Into<String>, kind: StepKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            position: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn at(mut self, position: usize) -> Self {
        self.position = Some(position);
        self
    }
}

/// Request to set a workflow's trigger
#[derive(Debug, Clone)]
pub struct SetTriggerRequest {
    pub id: Option<String>,
    pub prompt: String,
    pub model_id: String,
    pub filter: TriggerFilter,
}

impl SetTriggerRequest {
    pub fn new(prompt: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            id: None,
            prompt: prompt.into(),
            model_id: model_id.into(),
            filter: TriggerFilter::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_filter(mut self, filter: TriggerFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Validates every definition change before it reaches the store
pub struct DefinitionService {
    store: Arc<dyn DefinitionStore>,
    registry: Option<Arc<dyn ToolRegistry>>,
}

impl std::fmt::Debug for DefinitionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionService")
            .field("store", &self.store)
            .field("has_registry", &self.registry.is_some())
            .finish()
    }
}

impl DefinitionService {
    pub fn new(store: Arc<dyn DefinitionStore>) -> Self {
        Self {
            store,
            registry: None,
        }
    }

    /// Check agent tools against a registry
    pub fn with_registry(mut self, registry: Arc<dyn ToolRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    // Workflows

    pub async fn create_workflow(&self, request: CreateWorkflowRequest) -> Result<Workflow, WorkflowError> {
        let id = match request.id {
            Some(id) => WorkflowId::new(id)?,
            None => WorkflowId::generate(),
        };

        let mut workflow = Workflow::new(id, request.name).with_active(request.active);
        if let Some(description) = request.description {
            workflow = workflow.with_description(description);
        }

        let created = self.store.create_workflow(workflow).await?;
        info!(workflow_id = %created.id(), "Workflow created");
        Ok(created)
    }

    pub async fn get_workflow(&self, id: &WorkflowId) -> Result<Workflow, WorkflowError> {
        self.store
            .get_workflow(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(id.as_str()))
    }

    pub async fn list_workflows(&self) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self.store.list_workflows().await?)
    }

    /// Load a workflow with its trigger and ordered steps
    pub async fn get_definition(&self, id: &WorkflowId) -> Result<WorkflowDefinition, WorkflowError> {
        let workflow = self.get_workflow(id).await?;
        let steps = self.store.get_steps(id).await?;
        let trigger = self.store.get_trigger(id).await?;
        WorkflowDefinition::new(workflow, trigger, steps)
    }

    pub async fn set_active(&self, id: &WorkflowId, active: bool) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.get_workflow(id).await?;
        workflow.set_active(active);
        Ok(self.store.update_workflow(workflow).await?)
    }

    pub async fn delete_workflow(&self, id: &WorkflowId) -> Result<bool, WorkflowError> {
        let deleted = self.store.delete_workflow(id).await?;
        if deleted {
            info!(workflow_id = %id, "Workflow deleted");
        }
        Ok(deleted)
    }

    // Steps

    /// Add a step, appended or inserted at `request.position`
    pub async fn add_step(
        &self,
        workflow_id: &WorkflowId,
        request: AddStepRequest,
    ) -> Result<Step, WorkflowError> {
        let definition = self.get_definition(workflow_id).await?;
        let mut workflow = definition.workflow().clone();

        let id = match request.id {
            Some(id) => StepId::new(id)?,
            None => StepId::generate(),
        };

        if let Some(tools) = request.kind.tools() {
            self.check_registered(&id, tools).await?;
        }

        let index = workflow.insert_step(id.clone(), request.position)?;

        if let StepKind::StopChecker(checker) = &request.kind {
            check_stop_reference(&id, checker, &workflow.step_ids()[..index], definition.trigger())
                .inspect_err(log_rejection)?;
        }

        let step = Step::new(id, workflow_id.clone(), request.name, request.kind);
        let step = self.store.create_step(step).await?;
        self.store.update_workflow(workflow).await?;

        info!(workflow_id = %workflow_id, step_id = %step.id(), index, "Step added");
        Ok(step)
    }

    /// Remove a step. Later steps move up; placeholders and stop-checkers
    /// that referenced it are left dangling.
    pub async fn remove_step(&self, workflow_id: &WorkflowId, step_id: &StepId) -> Result<bool, WorkflowError> {
        let mut workflow = self.get_workflow(workflow_id).await?;
        if !workflow.remove_step(step_id) {
            return Ok(false);
        }

        self.store.update_workflow(workflow).await?;
        self.store.delete_step(workflow_id, step_id).await?;
        info!(workflow_id = %workflow_id, step_id = %step_id, "Step removed");
        Ok(true)
    }

    /// Move a step to `index`.
    ///
    /// Rejected when a stop-checker would end up before the step it inspects.
    pub async fn move_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        index: usize,
    ) -> Result<Workflow, WorkflowError> {
        let definition = self.get_definition(workflow_id).await?;
        let mut workflow = definition.workflow().clone();
        workflow.move_step(step_id, index)?;

        let kinds: HashMap<&StepId, &StepKind> =
            definition.steps().iter().map(|s| (s.id(), s.kind())).collect();
        let order = workflow.step_ids();

        for (position, id) in order.iter().enumerate() {
            if let Some(StepKind::StopChecker(checker)) = kinds.get(id) {
                if let StepReference::Step(target) = &checker.step_to_check {
                    let exists = order.contains(target);
                    if exists && !order[..position].contains(target) {
                        let err = WorkflowError::validation(format!(
                            "Stop checker '{}' would run before step '{}' it inspects",
                            id, target
                        ));
                        log_rejection(&err);
                        return Err(err);
                    }
                }
            }
        }

        let workflow = self.store.update_workflow(workflow).await?;
        info!(workflow_id = %workflow_id, step_id = %step_id, index, "Step moved");
        Ok(workflow)
    }

    pub async fn rename_step(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        name: impl Into<String>,
    ) -> Result<Step, WorkflowError> {
        let mut step = self.get_step(workflow_id, step_id).await?;
        step.set_name(name);
        Ok(self.store.update_step(step).await?)
    }

    /// Replace a step's template, returning placeholder warnings for it
    pub async fn update_template(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        template: impl Into<String>,
    ) -> Result<Vec<DefinitionWarning>, WorkflowError> {
        let definition = self.get_definition(workflow_id).await?;
        let mut step = definition
            .step(step_id)
            .cloned()
            .ok_or_else(|| WorkflowError::step_not_found(step_id.as_str()))?;

        let template = template.into();
        step.set_template(template.clone())?;
        self.store.update_step(step).await?;

        let warnings = definition.template_warnings(step_id, &template);
        for warning in &warnings {
            warn!(workflow_id = %workflow_id, %warning, "Template warning");
        }
        Ok(warnings)
    }

    /// Replace a stop-checker's configuration
    pub async fn update_stop_checker(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        checker: StopCheckerStep,
    ) -> Result<Step, WorkflowError> {
        let definition = self.get_definition(workflow_id).await?;
        let position = definition
            .workflow()
            .position_of(step_id)
            .ok_or_else(|| WorkflowError::step_not_found(step_id.as_str()))?;

        let mut step = definition
            .step(step_id)
            .cloned()
            .ok_or_else(|| WorkflowError::step_not_found(step_id.as_str()))?;

        if !step.kind().is_stop_checker() {
            return Err(WorkflowError::validation(format!(
                "Step '{}' is not a stop checker",
                step_id
            )));
        }

        check_stop_reference(
            step_id,
            &checker,
            &definition.workflow().step_ids()[..position],
            definition.trigger(),
        )
        .inspect_err(log_rejection)?;

        *step.kind_mut() = StepKind::StopChecker(checker);
        Ok(self.store.update_step(step).await?)
    }

    // Agent tools

    /// Make a registered tool available to an agent step (disabled)
    pub async fn add_tool(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        tool_id: ToolId,
    ) -> Result<bool, WorkflowError> {
        if let Some(registry) = &self.registry {
            if registry.get_tool(&tool_id).await?.is_none() {
                return Err(WorkflowError::tool_constraint(
                    step_id.as_str(),
                    ToolConstraintError::UnknownTool(tool_id.to_string()),
                ));
            }
        }

        self.edit_tools(workflow_id, step_id, |tools| Ok(tools.add_tool(tool_id)))
            .await
    }

    pub async fn remove_tool(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        tool_id: &ToolId,
    ) -> Result<bool, WorkflowError> {
        self.edit_tools(workflow_id, step_id, |tools| Ok(tools.remove_tool(tool_id)))
            .await
    }

    /// Toggle `enabled`. A no-op on required tools.
    pub async fn set_tool_enabled(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        tool_id: &ToolId,
        enabled: bool,
    ) -> Result<bool, WorkflowError> {
        self.edit_tools(workflow_id, step_id, |tools| tools.set_enabled(tool_id, enabled))
            .await
    }

    /// Toggle `required`, appending to or compacting the required order
    pub async fn set_tool_required(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        tool_id: &ToolId,
        required: bool,
    ) -> Result<bool, WorkflowError> {
        self.edit_tools(workflow_id, step_id, |tools| tools.set_required(tool_id, required))
            .await
    }

    pub async fn move_required_tool(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        tool_id: &ToolId,
        index: usize,
    ) -> Result<bool, WorkflowError> {
        self.edit_tools(workflow_id, step_id, |tools| {
            tools.move_required(tool_id, index).map(|_| true)
        })
        .await
    }

    /// An agent step's tools in display order, named through the registry
    pub async fn tool_presentation(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
    ) -> Result<Vec<ToolEntry>, WorkflowError> {
        let step = self.get_step(workflow_id, step_id).await?;
        let tools = step
            .kind()
            .tools()
            .ok_or_else(|| not_agent(step_id))?;

        let names: HashMap<ToolId, String> = match &self.registry {
            Some(registry) => registry
                .list_tools()
                .await?
                .into_iter()
                .map(|t| (t.id, t.name))
                .collect(),
            None => HashMap::new(),
        };

        Ok(tools.presentation_order(|id| names.get(id).cloned()))
    }

    // Trigger

    /// Attach a trigger, replacing any existing one
    pub async fn set_trigger(
        &self,
        workflow_id: &WorkflowId,
        request: SetTriggerRequest,
    ) -> Result<Trigger, WorkflowError> {
        let mut workflow = self.get_workflow(workflow_id).await?;

        let id = match request.id {
            Some(id) => TriggerId::new(id)?,
            None => TriggerId::generate(),
        };

        let trigger = Trigger::new(id.clone(), workflow_id.clone(), request.prompt, request.model_id)
            .with_filter(request.filter);

        let trigger = self.store.put_trigger(trigger).await?;
        if let Some(previous) = workflow.trigger_id().filter(|previous| **previous != id) {
            info!(workflow_id = %workflow_id, trigger_id = %previous, "Replacing trigger");
        }
        workflow.set_trigger(id);
        self.store.update_workflow(workflow).await?;

        info!(workflow_id = %workflow_id, trigger_id = %trigger.id(), "Trigger set");
        Ok(trigger)
    }

    /// Detach the trigger. Steps are kept.
    ///
    /// Rejected while a stop-checker still inspects the trigger.
    pub async fn remove_trigger(&self, workflow_id: &WorkflowId) -> Result<bool, WorkflowError> {
        let definition = self.get_definition(workflow_id).await?;
        let mut workflow = definition.workflow().clone();
        if workflow.clear_trigger().is_none() {
            return Ok(false);
        }

        let inspecting = definition.steps().iter().find(|step| {
            matches!(
                step.kind(),
                StepKind::StopChecker(checker) if checker.step_to_check == StepReference::Trigger
            )
        });
        if let Some(step) = inspecting {
            let err = WorkflowError::dangling_reference(format!(
                "Stop checker '{}' inspects the trigger",
                step.id()
            ));
            log_rejection(&err);
            return Err(err);
        }

        self.store.update_workflow(workflow).await?;
        self.store.delete_trigger(workflow_id).await?;
        info!(workflow_id = %workflow_id, "Trigger removed");
        Ok(true)
    }

    // Lint

    /// Placeholder and stop-checker warnings for the whole workflow
    pub async fn template_warnings(&self, workflow_id: &WorkflowId) -> Result<Vec<DefinitionWarning>, WorkflowError> {
        Ok(self.get_definition(workflow_id).await?.lint())
    }

    async fn get_step(&self, workflow_id: &WorkflowId, step_id: &StepId) -> Result<Step, WorkflowError> {
        self.store
            .get_step(workflow_id, step_id)
            .await?
            .ok_or_else(|| WorkflowError::step_not_found(step_id.as_str()))
    }

    async fn edit_tools<F>(
        &self,
        workflow_id: &WorkflowId,
        step_id: &StepId,
        edit: F,
    ) -> Result<bool, WorkflowError>
    where
        F: FnOnce(&mut ToolConstraints) -> Result<bool, ToolConstraintError>,
    {
        let mut step = self.get_step(workflow_id, step_id).await?;
        let tools = step.kind_mut().tools_mut().ok_or_else(|| not_agent(step_id))?;

        let changed = edit(tools)
            .map_err(|e| WorkflowError::tool_constraint(step_id.as_str(), e))
            .inspect_err(log_rejection)?;

        if changed {
            self.store.update_step(step).await?;
        }
        Ok(changed)
    }

    async fn check_registered(&self, step_id: &StepId, tools: &ToolConstraints) -> Result<(), WorkflowError> {
        let Some(registry) = &self.registry else {
            return Ok(());
        };

        for (tool_id, _) in tools.settings() {
            if registry.get_tool(&tool_id).await?.is_none() {
                return Err(WorkflowError::tool_constraint(
                    step_id.as_str(),
                    ToolConstraintError::UnknownTool(tool_id.to_string()),
                ));
            }
        }
        Ok(())
    }
}

fn not_agent(step_id: &StepId) -> WorkflowError {
    WorkflowError::validation(format!("Step '{}' is not an agent step", step_id))
}

fn log_rejection(err: &WorkflowError) {
    warn!(error = %err, "Definition change rejected");
}

/// A stop-checker may inspect the trigger (when there is one) or a step
/// that runs before it
fn check_stop_reference(
    step_id: &StepId,
    checker: &StopCheckerStep,
    preceding: &[StepId],
    trigger: Option<&Trigger>,
) -> Result<(), WorkflowError> {
    match &checker.step_to_check {
        StepReference::Trigger if trigger.is_none() => Err(WorkflowError::dangling_reference(format!(
            "Stop checker '{}' inspects the trigger but the workflow has none",
            step_id
        ))),
        StepReference::Trigger => Ok(()),
        StepReference::Step(target) if preceding.contains(target) => Ok(()),
        StepReference::Step(target) => Err(WorkflowError::dangling_reference(format!(
            "Stop checker '{}' must inspect an earlier step, not '{}'",
            step_id, target
        ))),
    }
}
