use axum::{
    body::Body,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::warn;

/// Token expected on `Authorization: Bearer <TOKEN>`. `None` leaves the
/// guarded routes open (local development).
#[derive(Clone, Default)]
pub struct BearerConfig {
    pub token: Option<String>,
}

impl BearerConfig {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }
}

/// Constant-time comparison of a provided token against the expected one.
pub fn token_matches(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Axum middleware rejecting requests without the configured bearer token.
/// The [`BearerConfig`] is read from request extensions.
pub async fn require_bearer(req: Request<Body>, next: Next) -> Response {
    let cfg = req
        .extensions()
        .get::<BearerConfig>()
        .cloned()
        .unwrap_or_default();
    if let Some(expected) = cfg.token {
        let ok = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "))
            .map(|provided| token_matches(&expected, provided.trim()))
            .unwrap_or(false);
        if !ok {
            warn!(path = %req.uri().path(), "rejected request with missing or invalid bearer token");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }
    next.run(req).await
}
