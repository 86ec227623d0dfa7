//! Run and dispatch commands - execute a bundle against the HTTP step backend

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::bundle::Bundle;
use crate::config::{AppConfig, BackendConfig};
use crate::domain::workflow::{InboundEvent, RunReport};
use crate::infrastructure::backend::HttpStepBackend;
use crate::infrastructure::workflow::{
    BackendTriggerClassifier, DispatchOutcome, InMemoryDefinitionStore, RunProgress, WorkflowRun,
    WorkflowRunner,
};

/// Arguments for the run command
#[derive(Args, Clone)]
pub struct RunArgs {
    /// Path to the bundle JSON file
    pub bundle: PathBuf,

    /// Text made available as `<<trigger_output>>`
    #[arg(long)]
    pub trigger_output: Option<String>,
}

/// Arguments for the dispatch command
#[derive(Args, Clone)]
pub struct DispatchArgs {
    /// Path to the bundle JSON file
    pub bundle: PathBuf,

    /// Sender address of the inbound message
    #[arg(long)]
    pub sender: String,

    #[arg(long)]
    pub subject: Option<String>,

    #[arg(long)]
    pub body: String,
}

/// Run a bundle from its first step and print the report
pub async fn run(args: RunArgs, config: &AppConfig) -> anyhow::Result<()> {
    let bundle = Bundle::load(&args.bundle)?;
    let workflow_id = bundle.definition.workflow().id().clone();

    let runner = build_runner(bundle, config)?;
    let cancel = cancel_on_ctrl_c();

    let (mut run, progress) = runner.run(&workflow_id, args.trigger_output, &cancel).await?;
    let report = drive(&runner, &mut run, progress, &cancel).await?;

    print_json(&report)
}

/// Offer an inbound message to the bundle's trigger, running the workflow if
/// it fires
pub async fn dispatch(args: DispatchArgs, config: &AppConfig) -> anyhow::Result<()> {
    let bundle = Bundle::load(&args.bundle)?;
    let workflow_id = bundle.definition.workflow().id().clone();

    let mut inbound = InboundEvent::new(args.sender, args.body);
    if let Some(subject) = args.subject {
        inbound = inbound.with_subject(subject);
    }

    let runner = build_runner(bundle, config)?;
    let cancel = cancel_on_ctrl_c();

    match runner.dispatch(&workflow_id, &inbound, &cancel).await? {
        (Some(mut run), DispatchOutcome::Started { progress }) => {
            let report = drive(&runner, &mut run, progress, &cancel).await?;
            print_json(&DispatchOutcome::Started {
                progress: RunProgress::Finished(report),
            })
        }
        (_, outcome) => print_json(&outcome),
    }
}

fn build_runner(bundle: Bundle, config: &AppConfig) -> anyhow::Result<WorkflowRunner> {
    let backend = Arc::new(build_backend(&config.backend)?);
    let store = Arc::new(InMemoryDefinitionStore::with_definitions([bundle.definition]));

    Ok(WorkflowRunner::new(store, backend.clone())
        .with_classifier(Arc::new(BackendTriggerClassifier::new(backend)))
        .with_config(config.runner.runner_config()))
}

fn build_backend(config: &BackendConfig) -> anyhow::Result<HttpStepBackend> {
    let mut backend = HttpStepBackend::new(&config.url)
        .with_timeout(Duration::from_millis(config.timeout_ms))?;

    if let Some(api_key) = &config.api_key {
        backend = backend.with_api_key(api_key);
    }

    info!(url = %backend.url(), "Using HTTP step backend");
    Ok(backend)
}

/// Advance the run until it finishes, answering human-input requests from
/// stdin. End of input or Ctrl-C aborts the waiting step.
async fn drive(
    runner: &WorkflowRunner,
    run: &mut WorkflowRun,
    mut progress: RunProgress,
    cancel: &CancellationToken,
) -> anyhow::Result<RunReport> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match progress {
            RunProgress::Finished(report) => return Ok(report),
            RunProgress::AwaitingInput { step_id, request } => {
                eprintln!("[{}] {} asks: {}", step_id, request.tool_name, request.prompt);

                match read_answer(&mut stdin, cancel).await? {
                    Some(answer) => run.submit_human_input(&request.tool_call_id, answer)?,
                    None => cancel.cancel(),
                }

                progress = runner.advance(run, cancel).await?;
            }
        }
    }
}

async fn read_answer(
    stdin: &mut Lines<BufReader<Stdin>>,
    cancel: &CancellationToken,
) -> anyhow::Result<Option<String>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        line = stdin.next_line() => Ok(line?),
    }
}

/// A token cancelled by the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, cancelling run");
            token.cancel();
        }
    });

    cancel
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
