//! API key gate.
//!
//! Every request outside the health namespace must carry `X-API-Key` equal to
//! the configured secret. Anything else is answered with a fixed 401 body
//! before it reaches a handler.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, StatusCode};
use subtle::ConstantTimeEq;

pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");

pub const UNAUTHORIZED_BODY: &str = r#"{"error":"Unauthorized - Invalid API Key"}"#;

/// Shared-secret check applied in front of the router.
#[derive(Clone)]
pub struct ApiKeyGate {
    api_key: Arc<str>,
}

impl ApiKeyGate {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: Arc::from(api_key),
        }
    }

    /// Whether a request for `path` with `headers` may proceed.
    pub fn admits(&self, path: &str, headers: &HeaderMap) -> bool {
        if ops_support::is_exempt(path) {
            return true;
        }

        headers
            .get(&API_KEY_HEADER)
            .is_some_and(|provided| self.matches(provided.as_bytes()))
    }

    fn matches(&self, provided: &[u8]) -> bool {
        provided.ct_eq(self.api_key.as_bytes()).into()
    }

    /// Middleware entry point for `axum::middleware::from_fn_with_state`.
    pub async fn check(State(gate): State<ApiKeyGate>, request: Request, next: Next) -> Response {
        let path = request.uri().path();
        if gate.admits(path, request.headers()) {
            return next.run(request).await;
        }

        tracing::warn!(
            path,
            method = %request.method(),
            key_present = request.headers().contains_key(&API_KEY_HEADER),
            "rejected request with invalid API key"
        );
        unauthorized()
    }
}

pub fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(CONTENT_TYPE, "application/json")],
        UNAUTHORIZED_BODY,
    )
        .into_response()
}
