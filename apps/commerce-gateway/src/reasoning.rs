//! Client for the external reasoning engine.
//!
//! The engine is opaque: it receives the user's message together with the
//! session context and answers with reply text and a replacement context. A
//! failed or slow call never surfaces to the caller as an error; it yields the
//! fixed [`FALLBACK_REPLY`] and the caller's context untouched.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ccg_core::{CanonicalMessage, SessionContext};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

use crate::config::ReasoningConfig;

pub const FALLBACK_REPLY: &str = "I had trouble processing your message, please try again";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningRequest {
    pub user_id: String,
    pub message: String,
    pub message_type: String,
    pub session_id: String,
    pub context: SessionContext,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningResponse {
    pub response_text: String,
    #[serde(default)]
    pub context: SessionContext,
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning call timed out after {0:?}")]
    Timeout(Duration),
    #[error("reasoning request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("reasoning engine returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("reasoning response could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("reasoning engine returned an empty reply")]
    EmptyReply,
}

#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn reason(&self, request: &ReasoningRequest)
    -> Result<ReasoningResponse, ReasoningError>;
}

/// Engine reached over HTTP with a JSON body.
pub struct HttpReasoningEngine {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpReasoningEngine {
    pub fn new(client: reqwest::Client, url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl ReasoningEngine for HttpReasoningEngine {
    async fn reason(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError> {
        let mut builder = self.client.post(&self.url).json(request);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await.map_err(ReasoningError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReasoningError::Status {
                status: status.as_u16(),
                body,
            });
        }
        response
            .json::<ReasoningResponse>()
            .await
            .map_err(ReasoningError::Decode)
    }
}

/// Result of one reasoning invocation as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasoningOutcome {
    pub reply_text: String,
    pub context: SessionContext,
    /// `true` when the fallback reply was produced and `context` is the
    /// caller's unchanged context.
    pub fallback: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u8,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::from_millis(50),
        }
    }
}

pub struct ReasoningClient {
    engine: Arc<dyn ReasoningEngine>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ReasoningClient {
    pub fn new(engine: Arc<dyn ReasoningEngine>, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            engine,
            timeout,
            retry,
        }
    }

    pub fn from_config(client: reqwest::Client, cfg: &ReasoningConfig) -> Self {
        let engine = HttpReasoningEngine::new(client, cfg.url.clone(), cfg.token.clone());
        Self::new(
            Arc::new(engine),
            cfg.timeout,
            RetryPolicy {
                max_retries: cfg.max_retries,
                ..RetryPolicy::default()
            },
        )
    }

    pub async fn invoke(
        &self,
        user_id: &str,
        message: &CanonicalMessage,
        session_id: &str,
        context: &SessionContext,
    ) -> ReasoningOutcome {
        let request = ReasoningRequest {
            user_id: user_id.to_string(),
            message: message.body.clone(),
            message_type: message.kind.as_str().to_string(),
            session_id: session_id.to_string(),
            context: context.clone(),
        };

        match self.call_with_retry(&request).await {
            Ok(response) => ReasoningOutcome {
                reply_text: response.response_text,
                context: response.context,
                fallback: false,
            },
            Err(err) => {
                error!(error = %err, "reasoning unavailable; replying with fallback");
                metrics::counter!("ccg_reasoning_fallback_total").increment(1);
                ReasoningOutcome {
                    reply_text: FALLBACK_REPLY.to_string(),
                    context: context.clone(),
                    fallback: true,
                }
            }
        }
    }

    async fn call_with_retry(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.call_once(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    if attempt > u32::from(self.retry.max_retries) {
                        return Err(err);
                    }
                    warn!(attempt, error = %err, "retrying reasoning request");
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                }
            }
        }
    }

    async fn call_once(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError> {
        let response = tokio::time::timeout(self.timeout, self.engine.reason(request))
            .await
            .map_err(|_| ReasoningError::Timeout(self.timeout))??;
        if response.response_text.trim().is_empty() {
            return Err(ReasoningError::EmptyReply);
        }
        Ok(response)
    }
}
