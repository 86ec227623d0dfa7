//! Tool constraints for agent steps
//!
//! Every known tool is in one of three states: disabled, enabled-optional, or
//! required. Required tools carry a position in an explicit ordered list, so
//! their `order` values are always the contiguous sequence `0..k`.
//!
//! On the wire the constraints are a map `tool_id -> {enabled, required, order}`;
//! deserialisation rejects maps whose required orders are not contiguous.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::ToolId;

/// Violations of the tool constraint invariants
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolConstraintError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Required tool '{0}' has no order")]
    MissingOrder(String),

    #[error("Order {order} is used more than once (tool '{tool}')")]
    DuplicateOrder { order: u32, tool: String },

    #[error("Required tool orders must be contiguous from 0: expected {expected}, found {found}")]
    OrderGap { expected: u32, found: u32 },

    #[error("Order index {index} out of range for {len} required tools")]
    OrderOutOfRange { index: usize, len: usize },

    #[error("Tool '{0}' is not required")]
    NotRequired(String),
}

/// Wire form of a single tool's settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSetting {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl ToolSetting {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            required: false,
            order: None,
        }
    }

    pub fn optional() -> Self {
        Self {
            enabled: true,
            required: false,
            order: None,
        }
    }

    pub fn required(order: u32) -> Self {
        Self {
            enabled: true,
            required: true,
            order: Some(order),
        }
    }
}

/// Effective state of a tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolStatus {
    Disabled,
    Optional,
    Required { order: usize },
}

/// A tool in presentation order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolEntry {
    pub id: ToolId,
    pub name: String,
    #[serde(flatten)]
    pub status: ToolStatus,
}

/// Tool availability and ordering for one agent step
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<ToolId, ToolSetting>",
    into = "BTreeMap<ToolId, ToolSetting>"
)]
pub struct ToolConstraints {
    /// Known tools that are not required, with their enabled flag
    optional: BTreeMap<ToolId, bool>,

    /// Required tools, in invocation order
    required: Vec<ToolId>,
}

impl ToolConstraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build constraints from the wire map, validating the required order
    pub fn from_settings(
        settings: BTreeMap<ToolId, ToolSetting>,
    ) -> Result<Self, ToolConstraintError> {
        let mut optional = BTreeMap::new();
        let mut ordered: BTreeMap<u32, ToolId> = BTreeMap::new();

        for (id, setting) in settings {
            if !setting.required {
                optional.insert(id, setting.enabled);
                continue;
            }

            let order = setting
                .order
                .ok_or_else(|| ToolConstraintError::MissingOrder(id.to_string()))?;

            if ordered.contains_key(&order) {
                return Err(ToolConstraintError::DuplicateOrder {
                    order,
                    tool: id.to_string(),
                });
            }
            ordered.insert(order, id);
        }

        for (expected, found) in ordered.keys().enumerate() {
            let expected = expected as u32;
            if *found != expected {
                return Err(ToolConstraintError::OrderGap {
                    expected,
                    found: *found,
                });
            }
        }

        Ok(Self {
            optional,
            required: ordered.into_values().collect(),
        })
    }

    /// Check a wire map without keeping the result
    pub fn validate_settings(
        settings: &BTreeMap<ToolId, ToolSetting>,
    ) -> Result<(), ToolConstraintError> {
        Self::from_settings(settings.clone()).map(|_| ())
    }

    /// Wire map view of the constraints
    pub fn settings(&self) -> BTreeMap<ToolId, ToolSetting> {
        let mut settings: BTreeMap<ToolId, ToolSetting> = self
            .optional
            .iter()
            .map(|(id, enabled)| {
                let setting = if *enabled {
                    ToolSetting::optional()
                } else {
                    ToolSetting::disabled()
                };
                (id.clone(), setting)
            })
            .collect();

        for (order, id) in self.required.iter().enumerate() {
            settings.insert(id.clone(), ToolSetting::required(order as u32));
        }

        settings
    }

    pub fn contains(&self, id: &ToolId) -> bool {
        self.optional.contains_key(id) || self.required.contains(id)
    }

    pub fn len(&self) -> usize {
        self.optional.len() + self.required.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn status(&self, id: &ToolId) -> Option<ToolStatus> {
        if let Some(order) = self.required.iter().position(|r| r == id) {
            return Some(ToolStatus::Required { order });
        }

        self.optional.get(id).map(|enabled| {
            if *enabled {
                ToolStatus::Optional
            } else {
                ToolStatus::Disabled
            }
        })
    }

    /// Required tools in invocation order
    pub fn required_tools(&self) -> &[ToolId] {
        &self.required
    }

    /// All tools the agent may call: required first, then optional ones by id
    pub fn enabled_tools(&self) -> Vec<ToolId> {
        self.required
            .iter()
            .cloned()
            .chain(
                self.optional
                    .iter()
                    .filter(|(_, enabled)| **enabled)
                    .map(|(id, _)| id.clone()),
            )
            .collect()
    }

    /// Register a tool as disabled. Known tools are left untouched.
    pub fn add_tool(&mut self, id: ToolId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.optional.insert(id, false);
        true
    }

    /// Forget a tool entirely, compacting the required order if needed
    pub fn remove_tool(&mut self, id: &ToolId) -> bool {
        if let Some(pos) = self.required.iter().position(|r| r == id) {
            self.required.remove(pos);
            return true;
        }
        self.optional.remove(id).is_some()
    }

    /// Toggle a tool's enabled flag.
    ///
    /// Required tools are always enabled; toggling them is a no-op and returns
    /// `Ok(false)`. Returns whether anything changed.
    pub fn set_enabled(&mut self, id: &ToolId, enabled: bool) -> Result<bool, ToolConstraintError> {
        if self.required.contains(id) {
            return Ok(false);
        }

        let current = self
            .optional
            .get_mut(id)
            .ok_or_else(|| ToolConstraintError::UnknownTool(id.to_string()))?;

        let changed = *current != enabled;
        *current = enabled;
        Ok(changed)
    }

    /// Toggle a tool's required flag.
    ///
    /// Marking a tool required appends it to the end of the order and enables
    /// it. Clearing the flag removes it from the order (later tools shift down
    /// by one) and leaves it enabled-optional. Returns whether anything changed.
    pub fn set_required(
        &mut self,
        id: &ToolId,
        required: bool,
    ) -> Result<bool, ToolConstraintError> {
        let position = self.required.iter().position(|r| r == id);

        match (position, required) {
            (Some(_), true) => Ok(false),
            (Some(pos), false) => {
                let removed = self.required.remove(pos);
                self.optional.insert(removed, true);
                Ok(true)
            }
            (None, true) => {
                if self.optional.remove(id).is_none() {
                    return Err(ToolConstraintError::UnknownTool(id.to_string()));
                }
                self.required.push(id.clone());
                Ok(true)
            }
            (None, false) => {
                if self.optional.contains_key(id) {
                    Ok(false)
                } else {
                    Err(ToolConstraintError::UnknownTool(id.to_string()))
                }
            }
        }
    }

    /// Move a required tool to a new position, shifting the others
    pub fn move_required(&mut self, id: &ToolId, index: usize) -> Result<(), ToolConstraintError> {
        let from = self
            .required
            .iter()
            .position(|r| r == id)
            .ok_or_else(|| {
                if self.optional.contains_key(id) {
                    ToolConstraintError::NotRequired(id.to_string())
                } else {
                    ToolConstraintError::UnknownTool(id.to_string())
                }
            })?;

        if index >= self.required.len() {
            return Err(ToolConstraintError::OrderOutOfRange {
                index,
                len: self.required.len(),
            });
        }

        let tool = self.required.remove(from);
        self.required.insert(index, tool);
        Ok(())
    }

    /// Tools in display order: required by order, then enabled-optional, then
    /// disabled, the last two sorted by name (ties broken by id).
    pub fn presentation_order<F>(&self, name_of: F) -> Vec<ToolEntry>
    where
        F: Fn(&ToolId) -> Option<String>,
    {
        let entry = |id: &ToolId, status: ToolStatus| ToolEntry {
            id: id.clone(),
            name: name_of(id).unwrap_or_else(|| id.to_string()),
            status,
        };

        let mut entries: Vec<ToolEntry> = self
            .required
            .iter()
            .enumerate()
            .map(|(order, id)| entry(id, ToolStatus::Required { order }))
            .collect();

        let by_name = |a: &ToolEntry, b: &ToolEntry| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id));

        let mut enabled: Vec<ToolEntry> = self
            .optional
            .iter()
            .filter(|(_, on)| **on)
            .map(|(id, _)| entry(id, ToolStatus::Optional))
            .collect();
        enabled.sort_by(by_name);

        let mut disabled: Vec<ToolEntry> = self
            .optional
            .iter()
            .filter(|(_, on)| !**on)
            .map(|(id, _)| entry(id, ToolStatus::Disabled))
            .collect();
        disabled.sort_by(by_name);

        entries.extend(enabled);
        entries.extend(disabled);
        entries
    }
}

impl TryFrom<BTreeMap<ToolId, ToolSetting>> for ToolConstraints {
    type Error = ToolConstraintError;

    fn try_from(value: BTreeMap<ToolId, ToolSetting>) -> Result<Self, Self::Error> {
        Self::from_settings(value)
    }
}

impl From<ToolConstraints> for BTreeMap<ToolId, ToolSetting> {
    fn from(constraints: ToolConstraints) -> Self {
        constraints.settings()
    }
}
