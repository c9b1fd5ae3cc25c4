#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use ccg_gateway::config::ReplyConfig;
use ccg_gateway::http::{AppState, router};
use ccg_gateway::reasoning::{
    ReasoningError, ReasoningRequest, ReasoningResponse, RetryPolicy,
};
use ccg_gateway::transport::TransportError;
use ccg_gateway::{
    ChannelTransport, Dispatcher, Orchestrator, ReasoningClient, ReasoningEngine,
    TransportMonitor, TransportState,
};
use ccg_core::SessionContext;
use ccg_session::{
    ConversationSession, MemorySessionStore, SeenMessages, SessionError, SessionStore,
    SharedSessionStore,
};
use security::{BearerConfig, SIGNATURE_HEADER, SignatureVerifier};
use serde_json::{Value, json};

pub const APP_SECRET: &str = "app-secret";
pub const VERIFY_TOKEN: &str = "verify-me";
pub const API_TOKEN: &str = "ops-token";

type Handler =
    dyn Fn(&ReasoningRequest) -> Result<ReasoningResponse, ReasoningError> + Send + Sync;

/// Reasoning engine answering through a closure and recording every request.
pub struct FakeEngine {
    handler: Box<Handler>,
    delay: Duration,
    pub seen: Mutex<Vec<ReasoningRequest>>,
}

impl FakeEngine {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ReasoningRequest) -> Result<ReasoningResponse, ReasoningError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            handler: Box::new(handler),
            delay: Duration::ZERO,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Replies with `text` and a context recording the turn's message.
    pub fn echo(text: &'static str) -> Self {
        Self::new(move |req| {
            Ok(ReasoningResponse {
                response_text: text.to_string(),
                context: json!({ "last": req.message })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            })
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<ReasoningRequest> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReasoningEngine for FakeEngine {
    async fn reason(
        &self,
        request: &ReasoningRequest,
    ) -> Result<ReasoningResponse, ReasoningError> {
        self.seen.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.handler)(request)
    }
}

/// Channel transport keeping every payload it was asked to send.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<Value>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelTransport for RecordingTransport {
    async fn send(&self, payload: &Value) -> Result<Option<String>, TransportError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(payload.clone());
        Ok(Some(format!("wamid.{}", sent.len())))
    }

    async fn probe(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Session store whose backend is always down.
pub struct FailingStore;

impl FailingStore {
    fn down<T>() -> Result<T, SessionError> {
        Err(SessionError::Unavailable("connection refused".into()))
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn get_or_create(&self, _user_id: &str) -> Result<ConversationSession, SessionError> {
        Self::down()
    }

    async fn get(&self, _user_id: &str) -> Result<Option<ConversationSession>, SessionError> {
        Self::down()
    }

    async fn touch(&self, _user_id: &str) -> Result<(), SessionError> {
        Self::down()
    }

    async fn update_context(
        &self,
        _user_id: &str,
        _context: SessionContext,
    ) -> Result<(), SessionError> {
        Self::down()
    }

    async fn sweep(&self, _max_idle: time::Duration) -> Result<usize, SessionError> {
        Self::down()
    }

    async fn count(&self) -> Result<usize, SessionError> {
        Self::down()
    }
}

pub fn failing_store() -> SharedSessionStore {
    Arc::new(FailingStore)
}

pub struct Harness {
    pub router: Router,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: SharedSessionStore,
    pub seen: Arc<SeenMessages>,
    pub engine: Arc<FakeEngine>,
    pub transport: Arc<RecordingTransport>,
    pub monitor: TransportMonitor,
    pub verifier: SignatureVerifier,
}

pub struct HarnessOptions {
    pub transport_state: TransportState,
    pub reasoning_timeout: Duration,
    pub request_timeout: Duration,
    pub api_token: Option<String>,
    /// Replaces the in-memory session store.
    pub sessions: Option<SharedSessionStore>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            transport_state: TransportState::Ready,
            reasoning_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            api_token: Some(API_TOKEN.to_string()),
            sessions: None,
        }
    }
}

pub fn harness(engine: FakeEngine) -> Harness {
    harness_with(engine, HarnessOptions::default())
}

pub fn harness_with(engine: FakeEngine, opts: HarnessOptions) -> Harness {
    let engine = Arc::new(engine);
    let transport = Arc::new(RecordingTransport::default());
    let sessions: SharedSessionStore = opts
        .sessions
        .unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
    let seen = Arc::new(SeenMessages::default());
    let (monitor, _task) = TransportMonitor::with_initial(opts.transport_state);

    let dispatcher = Arc::new(Dispatcher::new(
        transport.clone(),
        monitor.clone(),
        ReplyConfig {
            default_country_code: "506".into(),
            local_number_len: 8,
            footer: "Shaymee".into(),
        },
        Duration::from_secs(5),
    ));
    let verifier = SignatureVerifier::new(APP_SECRET);
    let orchestrator = Arc::new(Orchestrator::new(
        verifier.clone(),
        sessions.clone(),
        seen.clone(),
        ReasoningClient::new(
            engine.clone(),
            opts.reasoning_timeout,
            RetryPolicy::default(),
        ),
        dispatcher.clone(),
    ));

    let state = AppState {
        orchestrator: orchestrator.clone(),
        sessions: sessions.clone(),
        dispatcher,
        monitor: monitor.clone(),
        verify_token: VERIFY_TOKEN.to_string(),
        request_timeout: opts.request_timeout,
    };

    Harness {
        router: router(state, BearerConfig::new(opts.api_token)),
        orchestrator,
        sessions,
        seen,
        engine,
        transport,
        monitor,
        verifier,
    }
}

/// Webhook body carrying `messages` in a single change.
pub fn webhook_body(messages: Vec<Value>) -> Vec<u8> {
    let payload = json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "waba-1",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": { "phone_number_id": "123" },
                    "messages": messages,
                }
            }]
        }]
    });
    serde_json::to_vec(&payload).unwrap()
}

pub fn text_message(from: &str, id: &str, body: &str) -> Value {
    json!({
        "from": from,
        "id": id,
        "timestamp": "1714550400",
        "type": "text",
        "text": { "body": body },
    })
}

pub fn signed_webhook(verifier: &SignatureVerifier, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, verifier.sign(&body))
        .body(Body::from(body))
        .unwrap()
}

pub async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
