//! PMP Workflow Engine
//!
//! Executes workflows made of language-model, agent and stop-checker steps:
//! - A trigger decides whether inbound data starts a run
//! - Step prompts pull earlier outputs in through `<<...>>` placeholders
//! - Agent steps loop over backend turns, pausing for human input
//! - Stop-checkers end a run early based on an earlier output

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
