//! Multi-turn execution of a single step

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::llm::{HumanInputRequest, Message, StepBackend, StepContext, TurnResponse};
use crate::domain::workflow::placeholder::resolve_with_warnings;
use crate::domain::workflow::{OutputLedger, ResolutionWarning, Step, StepId, WorkflowError};
use crate::domain::DomainError;

/// Where a step invocation currently stands.
///
/// `Pending -> Thinking -> {ToolCallPending, Complete, Aborted, Failed}`;
/// a submitted human input moves `ToolCallPending` back to `Thinking`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Thinking,
    ToolCallPending(HumanInputRequest),
    Complete(String),
    Aborted,
    Failed(String),
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Aborted | Self::Failed(_))
    }
}

/// One invocation of a language-model or agent step
#[derive(Debug)]
pub struct StepExecution {
    step_id: StepId,
    step_name: String,
    template: String,
    context: StepContext,
    history: Vec<Message>,
    state: StepState,
    turns: usize,
    max_turns: usize,
    warnings: Vec<ResolutionWarning>,
}

impl StepExecution {
    /// Prepare a step for execution. Stop-checkers are not executable.
    pub fn new(step: &Step, max_turns: usize) -> Result<Self, WorkflowError> {
        let context = StepContext::for_step(step)
            .ok_or_else(|| WorkflowError::not_executable(step.id().as_str()))?;

        Ok(Self {
            step_id: step.id().clone(),
            step_name: step.name().to_string(),
            template: step.template().unwrap_or_default().to_string(),
            context,
            history: Vec::new(),
            state: StepState::Pending,
            turns: 0,
            max_turns,
            warnings: Vec::new(),
        })
    }

    pub fn step_id(&self) -> &StepId {
        &self.step_id
    }

    pub fn step_name(&self) -> &str {
        &self.step_name
    }

    pub fn state(&self) -> &StepState {
        &self.state
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    pub fn warnings(&self) -> &[ResolutionWarning] {
        &self.warnings
    }

    pub fn pending_input(&self) -> Option<&HumanInputRequest> {
        match &self.state {
            StepState::ToolCallPending(request) => Some(request),
            _ => None,
        }
    }

    /// Drive the step until it completes, fails, is cancelled or waits for a
    /// human.
    ///
    /// The template is resolved against `ledger` on the first call. The ledger
    /// is only read; recording the output is the caller's job. A result that
    /// arrives after `cancel` fires is discarded.
    pub async fn drive(
        &mut self,
        backend: &dyn StepBackend,
        ledger: &OutputLedger,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> &StepState {
        if self.state == StepState::Pending {
            self.begin(ledger, now);
        }

        if matches!(self.state, StepState::ToolCallPending(_)) && cancel.is_cancelled() {
            self.abort();
        }

        while self.state == StepState::Thinking {
            if cancel.is_cancelled() {
                self.abort();
                break;
            }

            if self.turns >= self.max_turns {
                self.fail(format!("exceeded {} turns without completing", self.max_turns));
                break;
            }

            self.turns += 1;
            debug!(
                step_id = %self.step_id,
                turn = self.turns,
                history = self.history.len(),
                backend = backend.backend_name(),
                "Requesting backend turn"
            );

            let turn = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = backend.step_turn(&self.context, &self.history, cancel) => Some(result),
            };

            match turn {
                None => self.abort(),
                Some(Ok(response)) => self.apply(response),
                Some(Err(e)) => self.fail_with(e),
            }
        }

        &self.state
    }

    /// Answer the pending human-input request and return to `Thinking`
    pub fn submit_human_input(
        &mut self,
        tool_call_id: &str,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        match &self.state {
            StepState::ToolCallPending(request) if request.tool_call_id == tool_call_id => {
                info!(step_id = %self.step_id, tool_call_id, "Human input received");
                self.history.push(Message::tool(tool_call_id, value));
                self.state = StepState::Thinking;
                Ok(())
            }
            _ => Err(WorkflowError::human_input_mismatch(tool_call_id)),
        }
    }

    /// Cancel a step that has not reached a terminal state
    pub fn abort(&mut self) {
        if !self.state.is_terminal() {
            info!(step_id = %self.step_id, turns = self.turns, "Step aborted");
            self.state = StepState::Aborted;
        }
    }

    fn begin(&mut self, ledger: &OutputLedger, now: DateTime<Utc>) {
        let resolution = resolve_with_warnings(&self.template, ledger, now);

        for warning in &resolution.warnings {
            warn!(step_id = %self.step_id, %warning, "Placeholder resolved to empty text");
        }

        self.warnings = resolution.warnings;
        self.history = vec![Message::system(resolution.text)];
        self.state = StepState::Thinking;
    }

    fn apply(&mut self, response: TurnResponse) {
        let final_text = response.final_text().map(str::to_string);
        let has_pending_calls = !response.pending_tool_calls().is_empty();
        self.history.extend(response.messages);

        if let Some(request) = response.human_input_required {
            info!(
                step_id = %self.step_id,
                tool_call_id = %request.tool_call_id,
                tool = %request.tool_name,
                "Waiting for human input"
            );
            self.state = StepState::ToolCallPending(request);
            return;
        }

        // Pending tool calls go back to the backend on the next turn
        if !response.is_complete || has_pending_calls {
            return;
        }

        match final_text {
            Some(text) => {
                debug!(step_id = %self.step_id, turns = self.turns, "Step complete");
                self.state = StepState::Complete(text);
            }
            None => self.fail("backend reported completion without an assistant message"),
        }
    }

    fn fail_with(&mut self, error: DomainError) {
        self.fail(error.to_string());
    }

    fn fail(&mut self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(step_id = %self.step_id, turns = self.turns, %reason, "Step failed");
        self.state = StepState::Failed(reason);
    }
}
