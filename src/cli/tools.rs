//! Tools command - an agent step's tools in presentation order

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;

use super::bundle::Bundle;
use crate::domain::workflow::{StepId, ToolStatus};
use crate::infrastructure::services::DefinitionService;
use crate::infrastructure::tools::StaticToolRegistry;
use crate::infrastructure::workflow::InMemoryDefinitionStore;

/// Arguments for the tools command
#[derive(Args, Clone)]
pub struct ToolsArgs {
    /// Path to the bundle JSON file
    pub bundle: PathBuf,

    /// Agent step to list tools for
    pub step: String,
}

pub async fn run(args: ToolsArgs) -> anyhow::Result<()> {
    let bundle = Bundle::load(&args.bundle)?;
    let workflow_id = bundle.definition.workflow().id().clone();
    let step_id = StepId::new(&args.step).context("Invalid step id")?;

    let service = DefinitionService::new(Arc::new(InMemoryDefinitionStore::with_definitions([
        bundle.definition,
    ])))
    .with_registry(Arc::new(StaticToolRegistry::new(bundle.tools)));

    for entry in service.tool_presentation(&workflow_id, &step_id).await? {
        let status = match entry.status {
            ToolStatus::Required { order } => format!("required #{}", order + 1),
            ToolStatus::Optional => "optional".to_string(),
            ToolStatus::Disabled => "disabled".to_string(),
        };
        println!("{:<14} {:<24} {}", status, entry.id.as_str(), entry.name);
    }

    Ok(())
}
