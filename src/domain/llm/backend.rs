use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

use super::{Message, ToolCall};
use crate::domain::workflow::{Step, StepId, ToolId, Trigger, WorkflowId};
use crate::domain::DomainError;

/// What the backend needs to know about the step it is driving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepContext {
    pub workflow_id: WorkflowId,

    /// Absent when the turn decides whether a trigger fires
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<StepId>,

    pub name: String,

    /// `language_model`, `agent` or `trigger`
    pub kind: String,

    pub model_id: String,

    /// Enabled tools, required ones first in their invocation order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolId>,

    /// Tools the model must call, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_tools: Vec<ToolId>,
}

impl StepContext {
    /// Context for an executable step; `None` for stop-checkers
    pub fn for_step(step: &Step) -> Option<Self> {
        let model_id = step.kind().model_id()?;
        let (tools, required_tools) = step
            .kind()
            .tools()
            .map(|t| (t.enabled_tools(), t.required_tools().to_vec()))
            .unwrap_or_default();

        Some(Self {
            workflow_id: step.workflow_id().clone(),
            step_id: Some(step.id().clone()),
            name: step.name().to_string(),
            kind: step.kind().type_name().to_string(),
            model_id: model_id.to_string(),
            tools,
            required_tools,
        })
    }

    pub fn for_trigger(trigger: &Trigger) -> Self {
        Self {
            workflow_id: trigger.workflow_id().clone(),
            step_id: None,
            name: trigger.id().to_string(),
            kind: "trigger".to_string(),
            model_id: trigger.model_id().to_string(),
            tools: Vec::new(),
            required_tools: Vec::new(),
        }
    }
}

/// A tool call that needs an answer from a person before the step continues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanInputRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub prompt: String,
}

/// One backend turn
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Messages produced this turn, appended to the history
    #[serde(default)]
    pub messages: Vec<Message>,

    #[serde(default)]
    pub is_complete: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub human_input_required: Option<HumanInputRequest>,
}

impl TurnResponse {
    /// A finished turn whose final assistant message is `content`
    pub fn complete(content: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::assistant(content)],
            is_complete: true,
            human_input_required: None,
        }
    }

    /// An unfinished turn carrying intermediate messages
    pub fn pending(messages: Vec<Message>) -> Self {
        Self {
            messages,
            is_complete: false,
            human_input_required: None,
        }
    }

    pub fn with_human_input(mut self, request: HumanInputRequest) -> Self {
        self.human_input_required = Some(request);
        self
    }

    /// Tool calls requested in this turn that no tool message in the same
    /// turn answers
    pub fn pending_tool_calls(&self) -> Vec<&ToolCall> {
        self.messages
            .iter()
            .flat_map(|m| &m.tool_calls)
            .filter(|call| {
                !self
                    .messages
                    .iter()
                    .any(|m| m.tool_call_id.as_deref() == Some(call.id.as_str()))
            })
            .collect()
    }

    /// Content of the last plain assistant message in this turn. Tool-call
    /// requests are not answers and are skipped.
    pub fn final_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == super::MessageRole::Assistant && !m.has_tool_calls())
            .map(|m| m.content.as_str())
    }
}

/// The language-model-calling backend that drives step turns
#[async_trait]
pub trait StepBackend: Send + Sync + Debug {
    /// Run one turn with the accumulated history.
    ///
    /// Implementations may watch `cancel`; callers discard any result that
    /// arrives after it fires.
    async fn step_turn(
        &self,
        context: &StepContext,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<TurnResponse, DomainError>;

    /// Backend name for logs and errors
    fn backend_name(&self) -> &'static str;
}
