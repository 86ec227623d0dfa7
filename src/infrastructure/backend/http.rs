//! Step backend reached over HTTP

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::http_client::HttpClient;
use crate::domain::llm::{Message, StepBackend, StepContext, TurnResponse};
use crate::domain::DomainError;

/// Posts `{"step": .., "messages": [..]}` to a fixed endpoint and reads a
/// turn response back
#[derive(Debug, Clone)]
pub struct HttpStepBackend {
    client: HttpClient,
    url: String,
    api_key: Option<String>,
}

impl HttpStepBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: HttpClient::new(),
            url: url.into(),
            api_key: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, DomainError> {
        self.client = HttpClient::with_timeout(timeout)?;
        Ok(self)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StepBackend for HttpStepBackend {
    async fn step_turn(
        &self,
        context: &StepContext,
        history: &[Message],
        cancel: &CancellationToken,
    ) -> Result<TurnResponse, DomainError> {
        let body = json!({
            "step": context,
            "messages": history,
        });

        let authorization = self.api_key.as_ref().map(|key| format!("Bearer {}", key));
        let mut headers = Vec::new();
        if let Some(value) = authorization.as_deref() {
            headers.push(("Authorization", value));
        }

        debug!(url = %self.url, messages = history.len(), "Posting step turn");

        let value = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DomainError::backend(self.backend_name(), "Request cancelled"));
            }
            result = self.client.post_json(&self.url, headers, &body) => result?,
        };

        serde_json::from_value(value).map_err(|e| {
            DomainError::backend(self.backend_name(), format!("Malformed turn response: {}", e))
        })
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
