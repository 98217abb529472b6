//! axum adapters around [`ProxyHandler`].

use super::error::ProxyError;
use crate::models::{IncomingRequest, OutgoingResponse};
use crate::startup::{AppState, MAX_BODY_BYTES};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{Method, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;

/// Liveness probe. Never touches the upstream API.
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": "gemini-proxy",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Accepts any method and hands the request to the proxy handler.
pub async fn proxy_endpoint(
    State(state): State<AppState>,
    method: Method,
    body: Result<Bytes, BytesRejection>,
) -> OutgoingResponse {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ProxyError::BodyTooLarge {
                    limit_bytes: MAX_BODY_BYTES,
                }
            } else {
                ProxyError::InvalidJson {
                    parse_error: rejection.body_text(),
                    received_body: "empty".to_string(),
                }
            };
            return state.handler.reject_body(method.as_str(), err);
        }
    };

    let body = if body.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(&body).into_owned())
    };

    state
        .handler
        .handle(IncomingRequest::new(method.as_str(), body))
        .await
}
