//! Validate command - structural checks plus placeholder lint

use anyhow::bail;

use super::bundle::Bundle;
use super::BundleArgs;

pub fn run(args: BundleArgs) -> anyhow::Result<()> {
    let bundle = Bundle::load(&args.bundle)?;

    let unknown = bundle.unknown_tools();
    if !unknown.is_empty() {
        bail!("Unknown tools: {}", unknown.join(", "));
    }

    let warnings = bundle.warnings();
    for warning in &warnings {
        println!("warning: {}", warning);
    }

    let workflow = bundle.definition.workflow();
    println!(
        "{} ({}): {} steps, {}, {} warning(s)",
        workflow.name(),
        workflow.id(),
        workflow.step_count(),
        if bundle.definition.trigger().is_some() { "trigger set" } else { "no trigger" },
        warnings.len()
    );

    Ok(())
}
