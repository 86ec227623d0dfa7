//! Trigger decisions made by asking the step backend

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::domain::llm::{Message, StepBackend, StepContext};
use crate::domain::workflow::{InboundEvent, Trigger, TriggerClassifier};
use crate::domain::DomainError;

const ANSWER_INSTRUCTION: &str =
    "Decide whether the message below should start this workflow. Answer with YES or NO only.";

/// Asks the backend the trigger's prompt and reads a yes/no answer
#[derive(Debug, Clone)]
pub struct BackendTriggerClassifier {
    backend: Arc<dyn StepBackend>,
}

impl BackendTriggerClassifier {
    pub fn new(backend: Arc<dyn StepBackend>) -> Self {
        Self { backend }
    }

    fn parse_answer(&self, answer: &str) -> Result<bool, DomainError> {
        let first_word = answer
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();

        match first_word.as_str() {
            "yes" | "true" => Ok(true),
            "no" | "false" => Ok(false),
            _ => Err(DomainError::backend(
                self.backend.backend_name(),
                format!("Unrecognised trigger answer: '{}'", answer.trim()),
            )),
        }
    }
}

#[async_trait]
impl TriggerClassifier for BackendTriggerClassifier {
    async fn should_fire(
        &self,
        trigger: &Trigger,
        inbound: &InboundEvent,
        cancel: &CancellationToken,
    ) -> Result<bool, DomainError> {
        let context = StepContext::for_trigger(trigger);
        let history = vec![
            Message::system(format!("{}\n\n{}", trigger.prompt(), ANSWER_INSTRUCTION)),
            Message::user(inbound.to_trigger_output()),
        ];

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DomainError::backend(
                    self.backend.backend_name(),
                    "Trigger check cancelled",
                ));
            }
            result = self.backend.step_turn(&context, &history, cancel) => result?,
        };

        let answer = response.final_text().ok_or_else(|| {
            DomainError::backend(self.backend.backend_name(), "Trigger check returned no answer")
        })?;

        let fire = self.parse_answer(answer)?;
        debug!(trigger_id = %trigger.id(), fire, "Trigger evaluated");
        Ok(fire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{MockStepBackend, TurnResponse};
    use crate::domain::workflow::{TriggerId, WorkflowId};
    use std::time::Duration;

    fn trigger() -> Trigger {
        Trigger::new(
            TriggerId::new("inbox").unwrap(),
            WorkflowId::new("triage").unwrap(),
            "Fire for invoices",
            "gpt-4o-mini",
        )
    }

    #[tokio::test]
    async fn test_yes_fires() {
        let backend = Arc::new(MockStepBackend::new().with_completion("Yes."));
        let classifier = BackendTriggerClassifier::new(backend.clone());

        let inbound = InboundEvent::new("a@b.com", "Invoice #12 attached");
        assert!(classifier.should_fire(&trigger(), &inbound, &CancellationToken::new()).await.unwrap());

        let call = &backend.calls()[0];
        assert_eq!(call.context.kind, "trigger");
        assert_eq!(call.context.model_id, "gpt-4o-mini");
        assert!(call.history[0].content.starts_with("Fire for invoices"));
        assert_eq!(call.history[1].content, "From: a@b.com\n\nInvoice #12 attached");
    }

    #[tokio::test]
    async fn test_no_declines() {
        let backend = Arc::new(MockStepBackend::new().with_completion("  NO"));
        let classifier = BackendTriggerClassifier::new(backend);

        let inbound = InboundEvent::new("a@b.com", "Weekly newsletter");
        assert!(!classifier.should_fire(&trigger(), &inbound, &CancellationToken::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_unclear_answer_is_error() {
        let backend = Arc::new(MockStepBackend::new().with_completion("maybe"));
        let classifier = BackendTriggerClassifier::new(backend);

        let err = classifier
            .should_fire(&trigger(), &InboundEvent::new("a@b.com", "x"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("maybe"));
    }

    #[tokio::test]
    async fn test_missing_answer_is_error() {
        let backend = Arc::new(MockStepBackend::new().with_turn(TurnResponse {
            messages: vec![],
            is_complete: true,
            human_input_required: None,
        }));
        let classifier = BackendTriggerClassifier::new(backend);

        assert!(classifier
            .should_fire(&trigger(), &InboundEvent::new("a@b.com", "x"), &CancellationToken::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cancelled_check_is_error() {
        let backend = Arc::new(MockStepBackend::new().with_delayed_turn(
            TurnResponse::complete("YES"),
            Duration::from_secs(30),
        ));
        let classifier = BackendTriggerClassifier::new(backend);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = classifier
            .should_fire(&trigger(), &InboundEvent::new("a@b.com", "x"), &cancel)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
