//! Placeholder resolution for step templates
//!
//! Recognised tokens (literal, case-sensitive):
//! - `<<trigger_output>>` - output of the trigger
//! - `<<step_output.{step_id}>>` - output of an earlier step
//! - `<<CURRENT_DATE.{tz}>>` - today's date (`YYYY-MM-DD`) in an IANA timezone
//!
//! Resolution is one left-to-right pass. Substituted values are never scanned
//! again, so a step output that itself contains `<<...>>` text is inserted
//! verbatim. Missing outputs resolve to the empty string and are reported as
//! warnings; resolution never fails.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use super::ledger::OutputLedger;

static PLACEHOLDER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"<<(?:(trigger_output)|step_output\.([A-Za-z0-9_-]+)|CURRENT_DATE\.([A-Za-z0-9_/+-]+))>>",
    )
    .unwrap()
});

/// A recognised placeholder token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Placeholder {
    TriggerOutput,
    StepOutput(String),
    CurrentDate(String),
}

impl Placeholder {
    fn from_captures(caps: &Captures<'_>) -> Option<Self> {
        if caps.get(1).is_some() {
            return Some(Self::TriggerOutput);
        }

        if let Some(step) = caps.get(2) {
            return Some(Self::StepOutput(step.as_str().to_string()));
        }

        caps.get(3)
            .map(|tz| Self::CurrentDate(tz.as_str().to_string()))
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerOutput => write!(f, "<<trigger_output>>"),
            Self::StepOutput(id) => write!(f, "<<step_output.{}>>", id),
            Self::CurrentDate(tz) => write!(f, "<<CURRENT_DATE.{}>>", tz),
        }
    }
}

/// Non-fatal problems found while resolving a template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ResolutionWarning {
    /// `<<trigger_output>>` used before the trigger produced output
    MissingTriggerOutput,

    /// `<<step_output.X>>` where X has no ledger entry (not run yet, or deleted)
    MissingStepOutput(String),

    /// `<<CURRENT_DATE.X>>` with a timezone that is not a known IANA id
    UnknownTimezone(String),
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingTriggerOutput => write!(f, "trigger has not produced output yet"),
            Self::MissingStepOutput(id) => write!(f, "no output recorded for step '{}'", id),
            Self::UnknownTimezone(tz) => write!(f, "unknown timezone '{}', using UTC", tz),
        }
    }
}

/// Resolved template text plus the misses encountered along the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    pub warnings: Vec<ResolutionWarning>,
}

/// Resolve all placeholders in `template` against `ledger`
pub fn resolve(template: &str, ledger: &OutputLedger, now: DateTime<Utc>) -> String {
    resolve_with_warnings(template, ledger, now).text
}

/// Resolve all placeholders and report misses
pub fn resolve_with_warnings(
    template: &str,
    ledger: &OutputLedger,
    now: DateTime<Utc>,
) -> Resolution {
    let mut warnings = Vec::new();

    let text = PLACEHOLDER_PATTERN
        .replace_all(template, |caps: &Captures<'_>| {
            match Placeholder::from_captures(caps) {
                Some(Placeholder::TriggerOutput) => match ledger.trigger() {
                    Some(output) => output.to_string(),
                    None => {
                        warnings.push(ResolutionWarning::MissingTriggerOutput);
                        String::new()
                    }
                },
                Some(Placeholder::StepOutput(id)) => match ledger.step_by_str(&id) {
                    Some(output) => output.to_string(),
                    None => {
                        warnings.push(ResolutionWarning::MissingStepOutput(id));
                        String::new()
                    }
                },
                Some(Placeholder::CurrentDate(tz)) => {
                    let zone = match tz.parse::<Tz>() {
                        Ok(zone) => zone,
                        Err(_) => {
                            warnings.push(ResolutionWarning::UnknownTimezone(tz));
                            Tz::UTC
                        }
                    };
                    format_date(now, zone)
                }
                None => caps[0].to_string(),
            }
        })
        .into_owned();

    Resolution { text, warnings }
}

/// List the placeholders in a template, in order of appearance
pub fn extract_placeholders(template: &str) -> Vec<Placeholder> {
    PLACEHOLDER_PATTERN
        .captures_iter(template)
        .filter_map(|caps| Placeholder::from_captures(&caps))
        .collect()
}

/// Check if a template contains any recognised placeholder
pub fn has_placeholders(template: &str) -> bool {
    PLACEHOLDER_PATTERN.is_match(template)
}

fn format_date(now: DateTime<Utc>, zone: Tz) -> String {
    now.with_timezone(&zone).format("%Y-%m-%d").to_string()
}

/// Source of the current time for date placeholders
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
