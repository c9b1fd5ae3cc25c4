use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{Extension, Json, Query},
    http::{HeaderMap, StatusCode},
    middleware,
    routing::{get, post},
};
use ccg_core::{DeliveryResult, OutboundReply, RawMessage};
use ccg_session::SharedSessionStore;
use security::{BearerConfig, require_bearer, token_matches};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::dispatcher::Dispatcher;
use crate::orchestrator::{Orchestrator, OrchestratorError, TurnReport};
use crate::transport::{TransportMonitor, TransportState};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: SharedSessionStore,
    pub dispatcher: Arc<Dispatcher>,
    pub monitor: TransportMonitor,
    pub verify_token: String,
    pub request_timeout: Duration,
}

#[derive(Serialize, Debug)]
pub struct ApiError {
    error: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn api_error(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.into(),
        }),
    )
}

impl From<OrchestratorError> for (StatusCode, Json<ApiError>) {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::Authentication => api_error(StatusCode::UNAUTHORIZED, "unauthorized"),
            OrchestratorError::BadPayload(reason) => api_error(StatusCode::BAD_REQUEST, reason),
            OrchestratorError::SessionInfrastructure(err) => {
                error!(error = %err, "session store failure");
                api_error(StatusCode::SERVICE_UNAVAILABLE, "service unavailable")
            }
        }
    }
}

/// Builds the gateway router. `/messages` and `/send` require the bearer token
/// from `bearer` when one is configured.
pub fn router(state: AppState, bearer: BearerConfig) -> Router {
    let protected = Router::new()
        .route("/messages", post(direct_message))
        .route("/send", post(send))
        .route_layer(middleware::from_fn(require_bearer));

    Router::new()
        .route("/webhook", get(handshake).post(webhook))
        .route("/health", get(health))
        .merge(protected)
        .layer(Extension(Arc::new(state)))
        .layer(Extension(bearer))
}

#[derive(Deserialize)]
struct HandshakeQs {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
    #[serde(rename = "hub.verify_token")]
    token: Option<String>,
}

async fn handshake(
    Extension(state): Extension<Arc<AppState>>,
    Query(q): Query<HandshakeQs>,
) -> (StatusCode, String) {
    let token_ok = !state.verify_token.is_empty()
        && q
            .token
            .as_deref()
            .is_some_and(|token| token_matches(&state.verify_token, token));
    if q.mode.as_deref() == Some("subscribe") && token_ok {
        (StatusCode::OK, q.challenge.unwrap_or_default())
    } else {
        warn!("webhook subscription handshake rejected");
        (StatusCode::FORBIDDEN, "forbidden".to_string())
    }
}

#[derive(Serialize, Debug)]
pub struct WebhookAck {
    status: &'static str,
    turns: usize,
}

async fn webhook(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<WebhookAck> {
    let turn = state.orchestrator.handle_webhook(&headers, &body);
    let reports = within(state.request_timeout, turn).await??;
    Ok(Json(WebhookAck {
        status: "processed",
        turns: reports.len(),
    }))
}

async fn direct_message(
    Extension(state): Extension<Arc<AppState>>,
    Json(raw): Json<RawMessage>,
) -> ApiResult<TurnReport> {
    let turn = state.orchestrator.handle_message(raw);
    let report = within(state.request_timeout, turn).await??;
    Ok(Json(report))
}

#[derive(Deserialize, Debug)]
pub struct SendRequest {
    pub to: String,
    pub reply: OutboundReply,
}

async fn send(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<SendRequest>,
) -> (StatusCode, Json<DeliveryResult>) {
    let result = state.dispatcher.deliver(&req.to, &req.reply).await;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(result))
}

#[derive(Serialize, Debug)]
pub struct Health {
    status: &'static str,
    transport: TransportState,
    active_sessions: Option<usize>,
    delivery_failures: u64,
}

async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Health> {
    let transport = state.monitor.state();
    let active_sessions = match state.sessions.count().await {
        Ok(count) => Some(count),
        Err(err) => {
            warn!(error = %err, "session count unavailable");
            None
        }
    };
    Json(Health {
        status: if transport == TransportState::Ready {
            "ok"
        } else {
            "degraded"
        },
        transport,
        active_sessions,
        delivery_failures: state.dispatcher.failure_count(),
    })
}

async fn within<F, T>(
    limit: Duration,
    fut: F,
) -> Result<Result<T, OrchestratorError>, (StatusCode, Json<ApiError>)>
where
    F: std::future::Future<Output = Result<T, OrchestratorError>>,
{
    tokio::time::timeout(limit, fut).await.map_err(|_| {
        error!(timeout_ms = limit.as_millis() as u64, "turn exceeded request timeout");
        api_error(StatusCode::GATEWAY_TIMEOUT, "turn timed out")
    })
}
