//! Outbound response types.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Headers attached to every response, errors and preflight included.
pub const RESPONSE_HEADERS: [(&str, &str); 4] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Headers", "Content-Type"),
    ("Access-Control-Allow-Methods", "POST, OPTIONS"),
    ("Content-Type", "application/json"),
];

/// Current UTC time in ISO-8601 form with millisecond precision.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Category of a failure, serialized in snake_case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Validation,
    Configuration,
    ApiResponse,
    ExternalApi,
    Timeout,
    Connectivity,
    Server,
}

/// Normalized JSON body returned for every failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDescriptor {
    pub error: String,
    pub error_code: String,
    pub error_type: ErrorType,
    pub details: Map<String, Value>,
    pub suggestion: String,
}

/// Body of a successful generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessBody {
    pub response: String,
    pub timestamp: String,
}

impl SuccessBody {
    pub fn new(response: String) -> Self {
        Self {
            response,
            timestamp: timestamp_now(),
        }
    }
}

/// The one response produced per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl OutgoingResponse {
    fn with_body(status: StatusCode, body: String) -> Self {
        Self {
            status_code: status.as_u16(),
            headers: RESPONSE_HEADERS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body,
        }
    }

    /// Empty-bodied 200 for CORS preflight.
    pub fn preflight() -> Self {
        Self::with_body(StatusCode::OK, String::new())
    }

    pub fn success(body: &SuccessBody) -> Self {
        Self::json(StatusCode::OK, body)
    }

    pub fn error(status: StatusCode, descriptor: &ErrorDescriptor) -> Self {
        Self::json(status, descriptor)
    }

    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::with_body(status, body),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                Self::with_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    r#"{"error":"Internal server error. Please try again later.","errorCode":"INTERNAL_SERVER_ERROR","errorType":"server","details":{},"suggestion":"An unexpected error occurred on the server. Please try again or contact support if the issue persists."}"#.to_string(),
                )
            }
        }
    }

    /// Look up a header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl IntoResponse for OutgoingResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Body::from(self.body)).into_response();
        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}
