//! Outbound channel transport and its readiness state.
//!
//! Readiness is owned by a single monitor task. Producers (the probe task and
//! the dispatcher) send [`TransportEvent`]s over an mpsc channel; readers see
//! the current [`TransportState`] through a watch channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::ChannelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    Initializing,
    Ready,
    Failed,
    Disconnected,
}

impl TransportState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportState::Initializing => "initializing",
            TransportState::Ready => "ready",
            TransportState::Failed => "failed",
            TransportState::Disconnected => "disconnected",
        }
    }
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Probe succeeded.
    Connected,
    /// Probe was answered with a rejection (bad credentials, unknown sender).
    ProbeFailed(String),
    /// The channel could not be reached at all.
    Lost(String),
}

impl TransportEvent {
    fn target(&self) -> TransportState {
        match self {
            TransportEvent::Connected => TransportState::Ready,
            TransportEvent::ProbeFailed(_) => TransportState::Failed,
            TransportEvent::Lost(_) => TransportState::Disconnected,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport not ready (state: {0})")]
    NotReady(TransportState),
    #[error("invalid recipient: {0:?}")]
    InvalidRecipient(String),
    #[error("delivery timed out after {0:?}")]
    Timeout(Duration),
    #[error("delivery request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("channel returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl TransportError {
    /// Whether the failure means the channel itself is unreachable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, TransportError::Http(_) | TransportError::Timeout(_))
    }
}

/// Handle to the readiness monitor. Cloning is cheap; the owning task stops
/// once every handle is dropped.
#[derive(Clone)]
pub struct TransportMonitor {
    events: mpsc::Sender<TransportEvent>,
    state: watch::Receiver<TransportState>,
}

impl TransportMonitor {
    pub fn spawn() -> (Self, JoinHandle<()>) {
        Self::with_initial(TransportState::Initializing)
    }

    pub fn with_initial(initial: TransportState) -> (Self, JoinHandle<()>) {
        let (events_tx, mut events_rx) = mpsc::channel::<TransportEvent>(32);
        let (state_tx, state_rx) = watch::channel(initial);

        let handle = tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let next = event.target();
                let previous = *state_tx.borrow();
                if previous == next {
                    continue;
                }
                state_tx.send_replace(next);
                match &event {
                    TransportEvent::Connected => {
                        info!(from = %previous, to = %next, "transport ready");
                    }
                    TransportEvent::ProbeFailed(reason) | TransportEvent::Lost(reason) => {
                        warn!(from = %previous, to = %next, reason = %reason, "transport state changed");
                    }
                }
            }
            debug!("transport monitor stopped");
        });

        (
            Self {
                events: events_tx,
                state: state_rx,
            },
            handle,
        )
    }

    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == TransportState::Ready
    }

    pub async fn report(&self, event: TransportEvent) {
        if self.events.send(event).await.is_err() {
            debug!("transport monitor gone; event dropped");
        }
    }

    /// Waits until the monitor publishes `target`.
    pub async fn wait_for(&self, target: TransportState) {
        let mut rx = self.state.clone();
        let _ = rx.wait_for(|state| *state == target).await;
    }
}

#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Sends an encoded payload; returns the channel's message id when one is
    /// reported.
    async fn send(&self, payload: &Value) -> Result<Option<String>, TransportError>;

    /// Checks that the channel accepts our credentials.
    async fn probe(&self) -> Result<(), TransportError>;
}

/// WhatsApp Cloud API transport.
pub struct CloudApiTransport {
    http: reqwest::Client,
    api_base: String,
    phone_id: String,
    user_token: String,
}

impl CloudApiTransport {
    pub fn new(http: reqwest::Client, cfg: &ChannelConfig) -> Self {
        Self {
            http,
            api_base: cfg.api_base.trim_end_matches('/').to_string(),
            phone_id: cfg.phone_id.clone(),
            user_token: cfg.user_token.clone(),
        }
    }

    fn is_mock(&self) -> bool {
        self.api_base.starts_with("mock://")
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.api_base, self.phone_id)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ChannelTransport for CloudApiTransport {
    async fn send(&self, payload: &Value) -> Result<Option<String>, TransportError> {
        if self.is_mock() {
            return Ok(Some(format!("mock:{}", self.phone_id)));
        }

        let response = self
            .http
            .post(self.messages_url())
            .bearer_auth(&self.user_token)
            .json(payload)
            .send()
            .await
            .map_err(TransportError::Http)?;
        let response = Self::check(response).await?;

        let raw: Value = response.json().await.unwrap_or(Value::Null);
        Ok(raw
            .get("messages")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn probe(&self) -> Result<(), TransportError> {
        if self.is_mock() {
            return Ok(());
        }
        let response = self
            .http
            .get(format!("{}/{}", self.api_base, self.phone_id))
            .bearer_auth(&self.user_token)
            .send()
            .await
            .map_err(TransportError::Http)?;
        Self::check(response).await.map(|_| ())
    }
}

/// Probes the transport immediately and then every `every`, reporting the
/// outcome to the monitor.
pub fn spawn_probe(
    transport: Arc<dyn ChannelTransport>,
    monitor: TransportMonitor,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let event = match transport.probe().await {
                Ok(()) => TransportEvent::Connected,
                Err(err) if err.is_connectivity() => TransportEvent::Lost(err.to_string()),
                Err(err) => TransportEvent::ProbeFailed(err.to_string()),
            };
            monitor.report(event).await;
        }
    })
}
