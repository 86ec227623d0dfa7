//! Workflow step type definitions

use serde::{Deserialize, Serialize};

use super::ids::StepId;
use super::ledger::LedgerKey;
use super::tools::ToolConstraints;

/// Type of workflow step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// Single language-model call producing one text output
    LanguageModel(LanguageModelStep),

    /// Tool-using agent driven over several turns
    Agent(AgentStep),

    /// Halts the run depending on an earlier output
    StopChecker(StopCheckerStep),
}

impl StepKind {
    /// Get a human-readable type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::LanguageModel(_) => "language_model",
            Self::Agent(_) => "agent",
            Self::StopChecker(_) => "stop_checker",
        }
    }

    /// The prompt template, for steps that carry one
    pub fn template(&self) -> Option<&str> {
        match self {
            Self::LanguageModel(step) => Some(&step.system_prompt),
            Self::Agent(step) => Some(&step.system_prompt),
            Self::StopChecker(_) => None,
        }
    }

    pub fn model_id(&self) -> Option<&str> {
        match self {
            Self::LanguageModel(step) => Some(&step.model_id),
            Self::Agent(step) => Some(&step.model_id),
            Self::StopChecker(_) => None,
        }
    }

    pub fn tools(&self) -> Option<&ToolConstraints> {
        match self {
            Self::Agent(step) => Some(&step.tools),
            _ => None,
        }
    }

    pub fn tools_mut(&mut self) -> Option<&mut ToolConstraints> {
        match self {
            Self::Agent(step) => Some(&mut step.tools),
            _ => None,
        }
    }

    pub fn is_stop_checker(&self) -> bool {
        matches!(self, Self::StopChecker(_))
    }
}

/// Language-model step configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LanguageModelStep {
    /// Model to call
    pub model_id: String,

    /// System prompt template (may contain placeholders)
    pub system_prompt: String,
}

impl LanguageModelStep {
    pub fn new(model_id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// Agent step configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStep {
    pub model_id: String,

    pub system_prompt: String,

    /// Tool availability and required invocation order
    #[serde(default)]
    pub tools: ToolConstraints,
}

impl AgentStep {
    pub fn new(model_id: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system_prompt: system_prompt.into(),
            tools: ToolConstraints::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolConstraints) -> Self {
        self.tools = tools;
        self
    }
}

/// What a stop-checker inspects
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepReference {
    Trigger,
    Step(StepId),
}

impl StepReference {
    pub fn ledger_key(&self) -> LedgerKey {
        match self {
            Self::Trigger => LedgerKey::Trigger,
            Self::Step(id) => LedgerKey::Step(id.clone()),
        }
    }
}

/// How match values are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    /// Halt when any match value is found
    StopIfContains,

    /// Halt unless at least one match value is found
    ContinueIfContains,
}

/// Stop-checker step configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StopCheckerStep {
    pub step_to_check: StepReference,

    pub check_mode: CheckMode,

    /// Case-insensitive substrings to look for
    #[serde(default)]
    pub match_values: Vec<String>,
}

impl StopCheckerStep {
    pub fn new(step_to_check: StepReference, check_mode: CheckMode) -> Self {
        Self {
            step_to_check,
            check_mode,
            match_values: Vec::new(),
        }
    }

    pub fn with_match_value(mut self, value: impl Into<String>) -> Self {
        self.match_values.push(value.into());
        self
    }

    pub fn with_match_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.match_values = values.into_iter().map(Into::into).collect();
        self
    }
}
