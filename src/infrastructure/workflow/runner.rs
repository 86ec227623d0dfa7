//! Workflow runner
//!
//! Sequences the steps of one run: stop-checkers are evaluated inline, every
//! other step is driven through a [`StepExecution`] and its output recorded in
//! the run's ledger before the next step starts.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::step_loop::{StepExecution, StepState};
use crate::domain::llm::{HumanInputRequest, StepBackend};
use crate::domain::workflow::stop_checker;
use crate::domain::workflow::{
    Clock, DefinitionStore, InboundEvent, OutputLedger, RunOutcome, RunReport,
    StepExecutionResult, StepId, StepKind, SystemClock, TriggerClassifier, WorkflowDefinition,
    WorkflowError, WorkflowId,
};

/// Default cap on backend turns for one step
pub const DEFAULT_MAX_TURNS_PER_STEP: usize = 25;

/// Configuration for the workflow runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Backend turns a step may take before it is failed
    pub max_turns_per_step: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_turns_per_step: DEFAULT_MAX_TURNS_PER_STEP,
        }
    }
}

/// What `advance` returns
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "progress", rename_all = "snake_case")]
pub enum RunProgress {
    /// The run ended; see the report's outcome
    Finished(RunReport),

    /// A step is waiting for a human answer; resume with
    /// [`WorkflowRun::submit_human_input`] then `advance` again
    AwaitingInput {
        step_id: StepId,
        request: HumanInputRequest,
    },
}

impl RunProgress {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Finished(report) => Some(report),
            Self::AwaitingInput { .. } => None,
        }
    }

    pub fn into_report(self) -> Option<RunReport> {
        match self {
            Self::Finished(report) => Some(report),
            Self::AwaitingInput { .. } => None,
        }
    }
}

/// Why inbound data did not start a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    Inactive,
    NoTrigger,
    SenderFiltered,
    Declined,
    ClassifierFailed(String),
}

/// Result of offering inbound data to a workflow
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "dispatch", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Skipped { reason: SkipReason },
    Started { progress: RunProgress },
}

/// State of one workflow run. Owned by the caller driving it.
#[derive(Debug)]
pub struct WorkflowRun {
    run_id: Uuid,
    definition: Arc<WorkflowDefinition>,
    ledger: OutputLedger,
    position: usize,
    current: Option<StepExecution>,
    step_started: Option<Instant>,
    step_results: Vec<StepExecutionResult>,
    started: Instant,
    finished: bool,
}

impl WorkflowRun {
    fn new(definition: Arc<WorkflowDefinition>, trigger_output: Option<String>) -> Self {
        let ledger = match trigger_output {
            Some(output) => OutputLedger::with_trigger(output),
            None => OutputLedger::new(),
        };

        Self {
            run_id: Uuid::new_v4(),
            definition,
            ledger,
            position: 0,
            current: None,
            step_started: None,
            step_results: Vec::new(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        self.definition.workflow().id()
    }

    pub fn ledger(&self) -> &OutputLedger {
        &self.ledger
    }

    /// Index of the step that runs next
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn pending_input(&self) -> Option<&HumanInputRequest> {
        self.current.as_ref().and_then(StepExecution::pending_input)
    }

    /// Answer the suspended step's human-input request
    pub fn submit_human_input(
        &mut self,
        tool_call_id: &str,
        value: impl Into<String>,
    ) -> Result<(), WorkflowError> {
        match self.current.as_mut() {
            Some(exec) => exec.submit_human_input(tool_call_id, value),
            None => Err(WorkflowError::human_input_mismatch(tool_call_id)),
        }
    }

    fn elapsed_ms(start: Instant) -> u64 {
        start.elapsed().as_millis() as u64
    }

    fn finish(&mut self, outcome: RunOutcome) -> RunProgress {
        self.finished = true;
        self.current = None;

        info!(
            run_id = %self.run_id,
            workflow_id = %self.workflow_id(),
            outcome = outcome.name(),
            steps = self.step_results.len(),
            "Workflow run finished"
        );

        RunProgress::Finished(RunReport {
            run_id: self.run_id,
            workflow_id: self.workflow_id().clone(),
            outcome,
            ledger: self.ledger.clone(),
            step_results: self.step_results.clone(),
            execution_time_ms: Self::elapsed_ms(self.started),
        })
    }
}

/// Executes workflows loaded from a definition store
#[derive(Clone)]
pub struct WorkflowRunner {
    store: Arc<dyn DefinitionStore>,
    backend: Arc<dyn StepBackend>,
    classifier: Option<Arc<dyn TriggerClassifier>>,
    clock: Arc<dyn Clock>,
    config: RunnerConfig,
}

impl std::fmt::Debug for WorkflowRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowRunner")
            .field("store", &self.store)
            .field("backend", &self.backend)
            .field("has_classifier", &self.classifier.is_some())
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish()
    }
}

impl WorkflowRunner {
    pub fn new(store: Arc<dyn DefinitionStore>, backend: Arc<dyn StepBackend>) -> Self {
        Self {
            store,
            backend,
            classifier: None,
            clock: Arc::new(SystemClock),
            config: RunnerConfig::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn TriggerClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Load a workflow with its trigger and steps, checking they agree
    pub async fn load(&self, workflow_id: &WorkflowId) -> Result<WorkflowDefinition, WorkflowError> {
        let workflow = self
            .store
            .get_workflow(workflow_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found(workflow_id.as_str()))?;
        let steps = self.store.get_steps(workflow_id).await?;
        let trigger = self.store.get_trigger(workflow_id).await?;

        WorkflowDefinition::new(workflow, trigger, steps)
    }

    /// Begin a run. Nothing executes until [`advance`](Self::advance).
    pub fn start(
        &self,
        definition: Arc<WorkflowDefinition>,
        trigger_output: Option<String>,
    ) -> WorkflowRun {
        let run = WorkflowRun::new(definition, trigger_output);
        info!(
            run_id = %run.run_id,
            workflow_id = %run.workflow_id(),
            steps = run.definition.steps().len(),
            "Workflow run started"
        );
        run
    }

    /// Execute steps until the run finishes or a step waits for human input
    pub async fn advance(
        &self,
        run: &mut WorkflowRun,
        cancel: &CancellationToken,
    ) -> Result<RunProgress, WorkflowError> {
        if run.finished {
            return Err(WorkflowError::validation(format!(
                "Run {} has already finished",
                run.run_id
            )));
        }

        let definition = Arc::clone(&run.definition);

        while let Some(step) = definition.steps().get(run.position) {
            if let StepKind::StopChecker(checker) = step.kind() {
                if cancel.is_cancelled() {
                    return Ok(run.finish(RunOutcome::Aborted { step_id: None }));
                }

                let decision = stop_checker::evaluate(checker, &run.ledger);
                debug!(
                    run_id = %run.run_id,
                    step_id = %step.id(),
                    halt = decision.halt,
                    matched = ?decision.matched,
                    "Stop condition evaluated"
                );

                let matched = decision.matched.clone();
                let halt = decision.halt;
                run.step_results
                    .push(StepExecutionResult::checked(step.id().clone(), step.name(), decision));

                if halt {
                    return Ok(run.finish(RunOutcome::Stopped {
                        step_id: step.id().clone(),
                        matched,
                    }));
                }

                run.position += 1;
                continue;
            }

            let mut exec = match run.current.take() {
                Some(exec) => exec,
                None => {
                    debug!(run_id = %run.run_id, step_id = %step.id(), "Starting step");
                    run.step_started = Some(Instant::now());
                    StepExecution::new(step, self.config.max_turns_per_step)?
                }
            };

            let state = exec
                .drive(self.backend.as_ref(), &run.ledger, self.clock.now(), cancel)
                .await
                .clone();

            let elapsed = run.step_started.map(WorkflowRun::elapsed_ms).unwrap_or_default();
            let turns = exec.turns();
            let warnings = exec.warnings().to_vec();
            let result = |r: StepExecutionResult| {
                r.with_turns(turns)
                    .with_warnings(warnings.clone())
                    .with_execution_time(elapsed)
            };

            match state {
                StepState::Complete(output) => {
                    run.step_results.push(result(StepExecutionResult::completed(
                        step.id().clone(),
                        step.name(),
                        output.clone(),
                    )));
                    run.ledger.record_step(step.id().clone(), output);
                    run.position += 1;
                }
                StepState::ToolCallPending(request) => {
                    run.current = Some(exec);
                    return Ok(RunProgress::AwaitingInput {
                        step_id: step.id().clone(),
                        request,
                    });
                }
                StepState::Aborted => {
                    run.step_results
                        .push(result(StepExecutionResult::aborted(step.id().clone(), step.name())));
                    return Ok(run.finish(RunOutcome::Aborted {
                        step_id: Some(step.id().clone()),
                    }));
                }
                StepState::Failed(reason) => {
                    run.step_results.push(result(StepExecutionResult::failed(
                        step.id().clone(),
                        step.name(),
                        reason.clone(),
                    )));
                    return Ok(run.finish(RunOutcome::failed(
                        format!("Step '{}' failed: {}", step.id(), reason),
                        Some(step.id().clone()),
                    )));
                }
                StepState::Pending | StepState::Thinking => {
                    return Err(WorkflowError::validation(format!(
                        "Step '{}' yielded without settling",
                        step.id()
                    )));
                }
            }
        }

        Ok(run.finish(RunOutcome::Completed))
    }

    /// Load and run a workflow from the start
    pub async fn run(
        &self,
        workflow_id: &WorkflowId,
        trigger_output: Option<String>,
        cancel: &CancellationToken,
    ) -> Result<(WorkflowRun, RunProgress), WorkflowError> {
        let definition = Arc::new(self.load(workflow_id).await?);
        let mut run = self.start(definition, trigger_output);
        let progress = self.advance(&mut run, cancel).await?;
        Ok((run, progress))
    }

    /// Offer inbound data to a workflow's trigger and run it if the trigger
    /// fires.
    ///
    /// Inactive workflows, workflows without a trigger, filtered senders and
    /// declined events are skipped.
    pub async fn dispatch(
        &self,
        workflow_id: &WorkflowId,
        inbound: &InboundEvent,
        cancel: &CancellationToken,
    ) -> Result<(Option<WorkflowRun>, DispatchOutcome), WorkflowError> {
        let definition = Arc::new(self.load(workflow_id).await?);

        let skipped = |reason: SkipReason| -> Result<(Option<WorkflowRun>, DispatchOutcome), WorkflowError> {
            debug!(workflow_id = %workflow_id, ?reason, "Inbound event skipped");
            Ok((None, DispatchOutcome::Skipped { reason }))
        };

        if !definition.workflow().is_active() {
            return skipped(SkipReason::Inactive);
        }

        let Some(trigger) = definition.trigger() else {
            return skipped(SkipReason::NoTrigger);
        };

        if !trigger.filter().admits(&inbound.sender) {
            return skipped(SkipReason::SenderFiltered);
        }

        if let Some(classifier) = &self.classifier {
            match classifier.should_fire(trigger, inbound, cancel).await {
                Ok(true) => {}
                Ok(false) => return skipped(SkipReason::Declined),
                Err(e) => {
                    warn!(workflow_id = %workflow_id, error = %e, "Trigger classifier failed");
                    return skipped(SkipReason::ClassifierFailed(e.to_string()));
                }
            }
        }

        let mut run = self.start(Arc::clone(&definition), Some(inbound.to_trigger_output()));
        let progress = self.advance(&mut run, cancel).await?;
        Ok((Some(run), DispatchOutcome::Started { progress }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{Message, MockStepBackend, ToolCall, TurnResponse};
    use crate::domain::workflow::repository::mock::MockDefinitionStore;
    use crate::domain::workflow::{
        AgentStep, CheckMode, FixedClock, LanguageModelStep, ListFilter, MockTriggerClassifier,
        Step, StepReference, StopCheckerStep, ToolId, Trigger, TriggerFilter, TriggerId, Workflow,
    };
    use crate::domain::DomainError;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::time::Duration;

    fn wid() -> WorkflowId {
        WorkflowId::new("triage").unwrap()
    }

    fn sid(s: &str) -> StepId {
        StepId::new(s).unwrap()
    }

    fn agent_step() -> Step {
        let mut agent = AgentStep::new("gpt-4o", "Find emails matching: <<trigger_output>>");
        let search = ToolId::new("search").unwrap();
        let send = ToolId::new("send").unwrap();
        agent.tools.add_tool(search.clone());
        agent.tools.add_tool(send.clone());
        agent.tools.set_required(&search, true).unwrap();
        agent.tools.set_enabled(&send, true).unwrap();

        Step::new(sid("agent"), wid(), "Find mail", StepKind::Agent(agent))
    }

    fn gate_step() -> Step {
        Step::new(
            sid("gate"),
            wid(),
            "Gate",
            StepKind::StopChecker(
                StopCheckerStep::new(StepReference::Step(sid("agent")), CheckMode::StopIfContains)
                    .with_match_value("no results"),
            ),
        )
    }

    fn summary_step() -> Step {
        Step::new(
            sid("summary"),
            wid(),
            "Summary",
            StepKind::LanguageModel(LanguageModelStep::new(
                "gpt-4o-mini",
                "On <<CURRENT_DATE.UTC>> summarize: <<step_output.agent>>",
            )),
        )
    }

    fn trigger() -> Trigger {
        Trigger::new(TriggerId::new("inbox").unwrap(), wid(), "Fire for mail searches", "gpt-4o-mini")
    }

    fn scenario_store(active: bool) -> MockDefinitionStore {
        let mut workflow = Workflow::new(wid(), "Triage").with_active(active);
        for id in ["agent", "gate", "summary"] {
            workflow.insert_step(sid(id), None).unwrap();
        }
        workflow.set_trigger(TriggerId::new("inbox").unwrap());

        MockDefinitionStore::new()
            .with_workflow(workflow)
            .with_trigger(trigger())
            .with_step(agent_step())
            .with_step(gate_step())
            .with_step(summary_step())
    }

    fn runner(store: MockDefinitionStore, backend: Arc<MockStepBackend>) -> WorkflowRunner {
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        WorkflowRunner::new(Arc::new(store), backend).with_clock(Arc::new(clock))
    }

    fn search_turn() -> TurnResponse {
        TurnResponse::pending(vec![
            Message::assistant_tool_calls(vec![ToolCall::new("c1", "search", json!({}))]),
            Message::tool("c1", "search results"),
        ])
    }

    #[tokio::test]
    async fn test_scenario_stopped_by_checker() {
        let backend = Arc::new(
            MockStepBackend::new()
                .with_turn(search_turn())
                .with_completion("no results found")
                .with_completion("never used"),
        );
        let runner = runner(scenario_store(true), backend.clone());

        let (run, progress) = runner
            .run(&wid(), Some("no results found".to_string()), &CancellationToken::new())
            .await
            .unwrap();

        let report = progress.into_report().unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::Stopped {
                step_id: sid("gate"),
                matched: Some("no results".to_string()),
            }
        );
        assert!(run.is_finished());
        assert_eq!(backend.call_count(), 2);
        assert_eq!(backend.remaining(), 1);
        assert!(report.ledger.step(&sid("summary")).is_none());
        assert_eq!(report.step_results.len(), 2);
    }

    #[tokio::test]
    async fn test_scenario_completed() {
        let backend = Arc::new(
            MockStepBackend::new()
                .with_turn(search_turn())
                .with_completion("found 3 emails")
                .with_completion("Three invoices arrived"),
        );
        let runner = runner(scenario_store(true), backend.clone());

        let (_, progress) = runner
            .run(&wid(), Some("invoices".to_string()), &CancellationToken::new())
            .await
            .unwrap();

        let report = progress.into_report().unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.ledger.len(), 3);
        assert_eq!(report.ledger.trigger(), Some("invoices"));
        assert_eq!(report.ledger.step(&sid("agent")), Some("found 3 emails"));
        assert_eq!(report.ledger.step(&sid("summary")), Some("Three invoices arrived"));

        let calls = backend.calls();
        assert_eq!(calls[0].history[0].content, "Find emails matching: invoices");
        assert_eq!(calls[0].context.required_tools, vec![ToolId::new("search").unwrap()]);
        assert_eq!(
            calls[2].history[0].content,
            "On 2024-01-01 summarize: found 3 emails"
        );
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_partial_ledger() {
        let backend = Arc::new(
            MockStepBackend::new()
                .with_completion("found 3 emails")
                .with_error("HTTP 500: upstream"),
        );
        let runner = runner(scenario_store(true), backend);

        let (_, progress) = runner
            .run(&wid(), Some("invoices".to_string()), &CancellationToken::new())
            .await
            .unwrap();

        let report = progress.into_report().unwrap();
        match &report.outcome {
            RunOutcome::Failed { reason, step_id } => {
                assert!(reason.contains("HTTP 500"));
                assert_eq!(step_id.as_ref(), Some(&sid("summary")));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(report.ledger.step(&sid("agent")), Some("found 3 emails"));
        assert_eq!(report.ledger.len(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_without_recording() {
        let backend = Arc::new(
            MockStepBackend::new()
                .with_turn(search_turn())
                .with_delayed_turn(TurnResponse::complete("found 3 emails"), Duration::from_secs(30)),
        );
        let runner = runner(scenario_store(true), backend);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let (_, progress) = runner
            .run(&wid(), Some("invoices".to_string()), &cancel)
            .await
            .unwrap();

        let report = progress.into_report().unwrap();
        assert_eq!(
            report.outcome,
            RunOutcome::Aborted {
                step_id: Some(sid("agent"))
            }
        );
        assert_eq!(report.ledger.len(), 1);
        assert!(report.ledger.step(&sid("agent")).is_none());
    }

    #[tokio::test]
    async fn test_human_input_suspends_run() {
        let request = HumanInputRequest {
            tool_call_id: "ask_1".to_string(),
            tool_name: "ask_user".to_string(),
            prompt: "Which folder?".to_string(),
        };
        let backend = Arc::new(
            MockStepBackend::new()
                .with_turn(TurnResponse::pending(vec![]).with_human_input(request.clone()))
                .with_completion("found 3 emails")
                .with_completion("done"),
        );
        let runner = runner(scenario_store(true), backend);
        let cancel = CancellationToken::new();

        let (mut run, progress) = runner
            .run(&wid(), Some("invoices".to_string()), &cancel)
            .await
            .unwrap();

        match progress {
            RunProgress::AwaitingInput { step_id, request: pending } => {
                assert_eq!(step_id, sid("agent"));
                assert_eq!(pending, request);
            }
            other => panic!("expected suspension, got {:?}", other),
        }
        assert_eq!(run.pending_input(), Some(&request));
        assert!(run.ledger().step(&sid("agent")).is_none());

        assert!(run.submit_human_input("wrong", "x").is_err());
        run.submit_human_input("ask_1", "Inbox").unwrap();

        let report = runner.advance(&mut run, &cancel).await.unwrap().into_report().unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(report.step_results[0].turns, 2);

        assert!(runner.advance(&mut run, &cancel).await.is_err());
    }

    #[tokio::test]
    async fn test_missing_workflow() {
        let backend = Arc::new(MockStepBackend::new());
        let runner = runner(MockDefinitionStore::new(), backend);

        let err = runner
            .run(&wid(), None, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, WorkflowError::not_found("triage"));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let backend = Arc::new(MockStepBackend::new());
        let runner = runner(MockDefinitionStore::new().with_error("disk gone"), backend);

        let err = runner.load(&wid()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Store(DomainError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_dispatch_skips_inactive_workflow() {
        let backend = Arc::new(MockStepBackend::new());
        let runner = runner(scenario_store(false), backend.clone());

        let (run, outcome) = runner
            .dispatch(&wid(), &InboundEvent::new("a@b.com", "hi"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(run.is_none());
        assert!(matches!(
            outcome,
            DispatchOutcome::Skipped {
                reason: SkipReason::Inactive
            }
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_applies_sender_filter() {
        let mut workflow = Workflow::new(wid(), "Triage");
        workflow.set_trigger(TriggerId::new("inbox").unwrap());
        let filtered = trigger().with_filter(TriggerFilter {
            sender_address: ListFilter::default(),
            sender_domain: ListFilter {
                whitelist: vec![],
                blacklist: vec!["spam.io".to_string()],
            },
        });
        let store = MockDefinitionStore::new()
            .with_workflow(workflow)
            .with_trigger(filtered);

        let mut classifier = MockTriggerClassifier::new();
        classifier.expect_should_fire().never();

        let runner = runner(store, Arc::new(MockStepBackend::new()))
            .with_classifier(Arc::new(classifier));

        let (_, outcome) = runner
            .dispatch(&wid(), &InboundEvent::new("x@spam.io", "buy"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            DispatchOutcome::Skipped {
                reason: SkipReason::SenderFiltered
            }
        ));
    }

    #[tokio::test]
    async fn test_dispatch_runs_when_trigger_fires() {
        let backend = Arc::new(
            MockStepBackend::new()
                .with_completion("found 3 emails")
                .with_completion("summary"),
        );

        let mut classifier = MockTriggerClassifier::new();
        classifier
            .expect_should_fire()
            .times(1)
            .returning(|_, inbound, _| Ok(inbound.body.contains("invoice")));

        let runner = runner(scenario_store(true), backend.clone())
            .with_classifier(Arc::new(classifier));

        let inbound = InboundEvent::new("boss@corp.com", "Please find the invoice").with_subject("Invoice");
        let (run, outcome) = runner
            .dispatch(&wid(), &inbound, &CancellationToken::new())
            .await
            .unwrap();

        let DispatchOutcome::Started { progress } = outcome else {
            panic!("expected the workflow to start");
        };
        let report = progress.into_report().unwrap();
        assert_eq!(report.outcome, RunOutcome::Completed);
        assert_eq!(
            run.unwrap().ledger().trigger(),
            Some("From: boss@corp.com\nSubject: Invoice\n\nPlease find the invoice")
        );
        assert!(backend.calls()[0].history[0].content.contains("Subject: Invoice"));
    }

    #[tokio::test]
    async fn test_dispatch_hands_cancellation_to_classifier() {
        let mut classifier = MockTriggerClassifier::new();
        classifier
            .expect_should_fire()
            .times(1)
            .returning(|_, _, cancel| Ok(!cancel.is_cancelled()));

        let backend = Arc::new(MockStepBackend::new());
        let runner = runner(scenario_store(true), backend.clone())
            .with_classifier(Arc::new(classifier));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (run, outcome) = runner
            .dispatch(&wid(), &InboundEvent::new("a@b.com", "invoice"), &cancel)
            .await
            .unwrap();

        assert!(run.is_none());
        assert!(matches!(
            outcome,
            DispatchOutcome::Skipped {
                reason: SkipReason::Declined
            }
        ));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_declined_and_classifier_failure() {
        let mut classifier = MockTriggerClassifier::new();
        let mut calls = 0;
        classifier.expect_should_fire().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Ok(false)
            } else {
                Err(DomainError::backend("http", "timeout"))
            }
        });

        let runner = runner(scenario_store(true), Arc::new(MockStepBackend::new()))
            .with_classifier(Arc::new(classifier));
        let inbound = InboundEvent::new("a@b.com", "newsletter");

        let (_, first) = runner
            .dispatch(&wid(), &inbound, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            first,
            DispatchOutcome::Skipped {
                reason: SkipReason::Declined
            }
        ));

        let (_, second) = runner
            .dispatch(&wid(), &inbound, &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            second,
            DispatchOutcome::Skipped {
                reason: SkipReason::ClassifierFailed(_)
            }
        ));
    }
}
