//! Workflow triggers
//!
//! A trigger decides whether inbound data starts a run. The decision has two
//! stages: a sender filter (allow/deny lists over address and domain), then a
//! model-backed check driven by the trigger's prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[cfg(test)]
use mockall::automock;

use super::ids::{TriggerId, WorkflowId};
use crate::domain::DomainError;

/// Allow and deny lists for one sender attribute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub whitelist: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blacklist: Vec<String>,
}

impl ListFilter {
    fn normalized(entry: &str) -> String {
        entry.trim().trim_start_matches('@').to_lowercase()
    }

    fn blacklisted(&self, value: &str) -> bool {
        self.blacklist.iter().any(|e| Self::normalized(e) == value)
    }

    fn whitelisted(&self, value: &str) -> bool {
        self.whitelist.iter().any(|e| Self::normalized(e) == value)
    }
}

/// Sender filter applied before a trigger is consulted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerFilter {
    #[serde(default)]
    pub sender_address: ListFilter,

    #[serde(default)]
    pub sender_domain: ListFilter,
}

impl TriggerFilter {
    /// Check whether a sender passes the filter.
    ///
    /// Any blacklist hit rejects. When either whitelist is non-empty the sender
    /// must appear in one of them; with both whitelists empty everyone else is
    /// admitted. Comparison is case-insensitive, and a display-form sender
    /// such as `Alice <alice@x.com>` is judged by the address in brackets.
    pub fn admits(&self, sender: &str) -> bool {
        let address = ListFilter::normalized(bare_address(sender));
        let domain = address
            .rsplit_once('@')
            .map(|(_, domain)| domain.to_string())
            .unwrap_or_default();

        if self.sender_address.blacklisted(&address) || self.sender_domain.blacklisted(&domain) {
            return false;
        }

        let has_whitelist =
            !self.sender_address.whitelist.is_empty() || !self.sender_domain.whitelist.is_empty();
        if !has_whitelist {
            return true;
        }

        self.sender_address.whitelisted(&address) || self.sender_domain.whitelisted(&domain)
    }
}

fn bare_address(sender: &str) -> &str {
    sender
        .rsplit_once('<')
        .and_then(|(_, rest)| rest.split_once('>'))
        .map(|(inner, _)| inner)
        .unwrap_or(sender)
}

/// The entity that decides whether inbound data starts a workflow run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    id: TriggerId,

    workflow_id: WorkflowId,

    #[serde(default)]
    filter: TriggerFilter,

    /// Human-authored instruction deciding whether to fire
    prompt: String,

    /// Model used to evaluate the prompt
    model_id: String,
}

impl Trigger {
    pub fn new(
        id: TriggerId,
        workflow_id: WorkflowId,
        prompt: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            id,
            workflow_id,
            filter: TriggerFilter::default(),
            prompt: prompt.into(),
            model_id: model_id.into(),
        }
    }

    pub fn with_filter(mut self, filter: TriggerFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn id(&self) -> &TriggerId {
        &self.id
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn filter(&self) -> &TriggerFilter {
        &self.filter
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Inbound data offered to a trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    pub body: String,
}

impl InboundEvent {
    pub fn new(sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            subject: None,
            body: body.into(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Text recorded as the trigger's ledger entry
    pub fn to_trigger_output(&self) -> String {
        match &self.subject {
            Some(subject) => format!(
                "From: {}\nSubject: {}\n\n{}",
                self.sender, subject, self.body
            ),
            None => format!("From: {}\n\n{}", self.sender, self.body),
        }
    }
}

/// Decides whether a trigger fires for inbound data that passed its filter
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TriggerClassifier: Send + Sync {
    async fn should_fire(
        &self,
        trigger: &Trigger,
        inbound: &InboundEvent,
        cancel: &CancellationToken,
    ) -> Result<bool, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(white: &[&str], black: &[&str]) -> ListFilter {
        ListFilter {
            whitelist: white.iter().map(|s| s.to_string()).collect(),
            blacklist: black.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_empty_filter_admits_everyone() {
        assert!(TriggerFilter::default().admits("anyone@example.com"));
        assert!(TriggerFilter::default().admits("not-an-address"));
    }

    #[test]
    fn test_blacklist_rejects() {
        let filter = TriggerFilter {
            sender_address: list(&[], &["spam@example.com"]),
            sender_domain: list(&[], &["junk.io"]),
        };

        assert!(!filter.admits("SPAM@example.com"));
        assert!(!filter.admits("promo@JUNK.io"));
        assert!(filter.admits("friend@example.com"));
    }

    #[test]
    fn test_whitelist_is_exclusive() {
        let filter = TriggerFilter {
            sender_address: list(&["boss@corp.com"], &[]),
            sender_domain: list(&["@partner.org"], &[]),
        };

        assert!(filter.admits("boss@corp.com"));
        assert!(filter.admits("anyone@partner.org"));
        assert!(!filter.admits("intern@corp.com"));
        assert!(!filter.admits("stranger@example.com"));
    }

    #[test]
    fn test_blacklist_wins_over_whitelist() {
        let filter = TriggerFilter {
            sender_address: list(&[], &["mallory@partner.org"]),
            sender_domain: list(&["partner.org"], &[]),
        };

        assert!(filter.admits("alice@partner.org"));
        assert!(!filter.admits("mallory@partner.org"));
    }

    #[test]
    fn test_display_form_sender_uses_bracketed_address() {
        let blocked = TriggerFilter {
            sender_address: list(&[], &[]),
            sender_domain: list(&[], &["x.com"]),
        };
        assert!(!blocked.admits("Alice <alice@x.com>"));
        assert!(!blocked.admits("\"Smith, Bob\" <BOB@X.COM>"));

        let allowed = TriggerFilter {
            sender_address: list(&["alice@x.com"], &[]),
            sender_domain: list(&[], &[]),
        };
        assert!(allowed.admits("Alice <alice@x.com>"));
        assert!(!allowed.admits("Alice <mallory@x.com>"));
    }

    #[test]
    fn test_trigger_output_format() {
        let event = InboundEvent::new("a@b.com", "hello").with_subject("Hi");
        assert_eq!(event.to_trigger_output(), "From: a@b.com\nSubject: Hi\n\nhello");

        let event = InboundEvent::new("a@b.com", "hello");
        assert_eq!(event.to_trigger_output(), "From: a@b.com\n\nhello");
    }

    #[test]
    fn test_trigger_serialization() {
        let trigger = Trigger::new(
            TriggerId::new("t1").unwrap(),
            WorkflowId::new("triage").unwrap(),
            "Fire for invoices",
            "gpt-4o-mini",
        );

        let json = serde_json::to_value(&trigger).unwrap();
        assert_eq!(json["workflow_id"], "triage");
        assert_eq!(json["prompt"], "Fire for invoices");

        let back: Trigger = serde_json::from_value(json).unwrap();
        assert_eq!(back, trigger);
    }
}
