//! Per-turn state machine: verify, normalize, resolve the session, reason,
//! update context and deliver.

use std::sync::Arc;

use axum::http::HeaderMap;
use ccg_core::{
    CanonicalMessage, DeliveryResult, OutboundReply, RawMessage, extract_messages, normalize,
};
use ccg_session::{SeenMessages, SessionError, SharedSessionStore};
use security::SignatureVerifier;
use serde::Serialize;
use thiserror::Error;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::dispatcher::Dispatcher;
use crate::reasoning::ReasoningClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStage {
    Verifying,
    Normalizing,
    SessionResolving,
    Reasoning,
    ContextUpdating,
    Delivering,
    Done,
}

impl TurnStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnStage::Verifying => "verifying",
            TurnStage::Normalizing => "normalizing",
            TurnStage::SessionResolving => "session_resolving",
            TurnStage::Reasoning => "reasoning",
            TurnStage::ContextUpdating => "context_updating",
            TurnStage::Delivering => "delivering",
            TurnStage::Done => "done",
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("webhook signature missing or invalid")]
    Authentication,
    #[error("malformed webhook payload: {0}")]
    BadPayload(String),
    #[error(transparent)]
    SessionInfrastructure(#[from] SessionError),
}

/// What happened during one turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub user_id: String,
    pub session_id: String,
    pub message: CanonicalMessage,
    pub reply: OutboundReply,
    pub fallback: bool,
    pub delivery: DeliveryResult,
}

pub struct Orchestrator {
    verifier: SignatureVerifier,
    sessions: SharedSessionStore,
    seen: Arc<SeenMessages>,
    reasoning: ReasoningClient,
    dispatcher: Arc<Dispatcher>,
}

impl Orchestrator {
    pub fn new(
        verifier: SignatureVerifier,
        sessions: SharedSessionStore,
        seen: Arc<SeenMessages>,
        reasoning: ReasoningClient,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            verifier,
            sessions,
            seen,
            reasoning,
            dispatcher,
        }
    }

    /// Authenticates a webhook delivery and runs one turn per carried message,
    /// in delivery order. Nothing is touched when the signature is rejected.
    ///
    /// Message ids already handled within the dedupe window are skipped. An id
    /// is claimed while its turn runs and kept only once the turn returns, so
    /// a delivery cut short picks up where it stopped when the provider
    /// retries it.
    pub async fn handle_webhook(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Vec<TurnReport>, OrchestratorError> {
        if !self.verifier.verify_headers(headers, body) {
            metrics::counter!("ccg_auth_failures_total").increment(1);
            warn!(stage = TurnStage::Verifying.as_str(), "rejected webhook delivery");
            return Err(OrchestratorError::Authentication);
        }

        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|err| OrchestratorError::BadPayload(err.to_string()))?;
        let messages = extract_messages(&payload);
        if messages.is_empty() {
            debug!("webhook delivery carried no messages");
        }

        let mut reports = Vec::with_capacity(messages.len());
        for raw in messages {
            let claim = match raw.id.as_deref().filter(|id| !id.is_empty()) {
                Some(id) => match self.seen.claim(id) {
                    Some(claim) => Some(claim),
                    None => {
                        metrics::counter!("ccg_duplicates_total").increment(1);
                        info!(msg_id = %id, "duplicate webhook message dropped");
                        continue;
                    }
                },
                None => None,
            };
            reports.push(self.handle_message(raw).await?);
            if let Some(claim) = claim {
                claim.keep();
            }
        }
        Ok(reports)
    }

    /// Runs a turn for an already-authenticated message.
    pub async fn handle_message(&self, raw: RawMessage) -> Result<TurnReport, OrchestratorError> {
        let user_id = raw.from.trim().to_string();
        if user_id.is_empty() {
            return Err(OrchestratorError::BadPayload("message without sender".into()));
        }
        metrics::counter!("ccg_ingress_total").increment(1);

        let span = info_span!(
            "turn",
            user_id = %user_id,
            session_id = tracing::field::Empty,
            stage = TurnStage::Normalizing.as_str(),
        );
        self.run_turn(user_id, raw).instrument(span).await
    }

    async fn run_turn(
        &self,
        user_id: String,
        raw: RawMessage,
    ) -> Result<TurnReport, OrchestratorError> {
        let span = tracing::Span::current();
        let message = normalize(&raw);

        span.record("stage", TurnStage::SessionResolving.as_str());
        let session = self.sessions.get_or_create(&user_id).await?;
        span.record("session_id", session.session_id.as_str());

        span.record("stage", TurnStage::Reasoning.as_str());
        let outcome = self
            .reasoning
            .invoke(&user_id, &message, &session.session_id, &session.context)
            .await;

        if !outcome.fallback {
            span.record("stage", TurnStage::ContextUpdating.as_str());
            self.sessions
                .update_context(&user_id, outcome.context)
                .await?;
        }

        span.record("stage", TurnStage::Delivering.as_str());
        let reply = OutboundReply::from(outcome.reply_text);
        let delivery = self.dispatcher.deliver(&user_id, &reply).await;

        span.record("stage", TurnStage::Done.as_str());
        info!(
            kind = message.kind.as_str(),
            fallback = outcome.fallback,
            delivered = delivery.success,
            "turn complete"
        );

        Ok(TurnReport {
            user_id,
            session_id: session.session_id,
            message,
            reply,
            fallback: outcome.fallback,
            delivery,
        })
    }
}
