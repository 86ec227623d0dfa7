//! CLI for the workflow engine
//!
//! Every subcommand works on a bundle file: one workflow with its trigger and
//! steps as JSON, plus an optional list of tool descriptors.
//! - `validate`: check a bundle and print placeholder warnings
//! - `run`: execute a bundle against the configured step backend
//! - `dispatch`: offer an inbound message to the bundle's trigger
//! - `tools`: show an agent step's tools in presentation order

pub mod bundle;
pub mod run;
pub mod tools;
pub mod validate;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// PMP Workflow Engine - trigger-gated chains of model, agent and stop-check steps
#[derive(Parser)]
#[command(name = "pmp-workflow-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Validate a bundle and list template warnings
    Validate(BundleArgs),

    /// Run a bundle from its first step
    Run(run::RunArgs),

    /// Offer an inbound message to the bundle's trigger
    Dispatch(run::DispatchArgs),

    /// Print an agent step's tools in presentation order
    Tools(tools::ToolsArgs),
}

/// A bundle file argument
#[derive(Args, Clone)]
pub struct BundleArgs {
    /// Path to the bundle JSON file
    pub bundle: PathBuf,
}

/// Load `.env`, configuration and logging. Falls back to defaults when the
/// configuration cannot be read.
pub fn init() -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);
    config
}
