//! Handler failures and their normalized client-facing form.

use crate::models::{response::timestamp_now, ErrorDescriptor, ErrorType, OutgoingResponse};
use crate::models::MAX_PROMPT_CHARS;
use crate::services::UpstreamError;
use axum::http::StatusCode;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

/// Every way a proxy invocation can fail.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Method not allowed: {received}")]
    MethodNotAllowed { received: String },

    #[error("Invalid JSON in request body: {parse_error}")]
    InvalidJson {
        parse_error: String,
        received_body: String,
    },

    #[error("Invalid prompt of type {prompt_type}")]
    InvalidPrompt {
        prompt_type: &'static str,
        prompt_length: usize,
        is_empty: bool,
    },

    /// `prompt_length` is the untrimmed length in UTF-16 code units.
    #[error("Prompt too long: {prompt_length} characters")]
    PromptTooLong { prompt_length: usize },

    /// The request body exceeded the server's buffer limit before it could
    /// be parsed.
    #[error("Request body exceeds {limit_bytes} bytes")]
    BodyTooLarge { limit_bytes: usize },

    #[error("GEMINI_API_KEY is not configured")]
    MissingApiKey,

    #[error("Upstream response contained no candidates")]
    NoCandidates {
        response_data: Value,
        candidates_length: usize,
    },

    #[error("Upstream candidate had no text")]
    InvalidResponseFormat { candidate: Value },

    #[error("Gemini API returned HTTP {status}")]
    UpstreamStatus { status: u16, body: Value },

    #[error("Upstream request timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Network error ({kind}): {message}")]
    Network { kind: String, message: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ProxyError {
    /// Convert a provider failure, recording the timeout that applied.
    pub fn from_upstream(err: UpstreamError, timeout: Duration) -> Self {
        match err {
            UpstreamError::Status { status, body } => ProxyError::UpstreamStatus { status, body },
            UpstreamError::Timeout => ProxyError::Timeout { after: timeout },
            UpstreamError::Network { kind, message } => ProxyError::Network { kind, message },
            other @ UpstreamError::Other(_) => ProxyError::Internal(anyhow::Error::new(other)),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::InvalidJson { .. }
            | ProxyError::InvalidPrompt { .. }
            | ProxyError::PromptTooLong { .. }
            | ProxyError::BodyTooLarge { .. } => StatusCode::BAD_REQUEST,
            ProxyError::MissingApiKey
            | ProxyError::NoCandidates { .. }
            | ProxyError::InvalidResponseFormat { .. }
            | ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamStatus { status, .. } => {
                if (400..500).contains(status) {
                    StatusCode::BAD_REQUEST
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }
            ProxyError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::Network { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
            ProxyError::InvalidJson { .. } => "INVALID_JSON",
            ProxyError::InvalidPrompt { .. } => "INVALID_PROMPT",
            ProxyError::PromptTooLong { .. } | ProxyError::BodyTooLarge { .. } => {
                "PROMPT_TOO_LONG"
            }
            ProxyError::MissingApiKey => "MISSING_API_KEY",
            ProxyError::NoCandidates { .. } => "NO_CANDIDATES",
            ProxyError::InvalidResponseFormat { .. } => "INVALID_RESPONSE_FORMAT",
            ProxyError::UpstreamStatus { status, .. } => match status {
                429 => "RATE_LIMIT_EXCEEDED",
                403 => "API_ACCESS_FORBIDDEN",
                400 => "BAD_REQUEST",
                404 => "API_ENDPOINT_NOT_FOUND",
                s if *s >= 500 => "GEMINI_SERVER_ERROR",
                _ => "GEMINI_API_ERROR",
            },
            ProxyError::Timeout { .. } => "REQUEST_TIMEOUT",
            ProxyError::Network { .. } => "NETWORK_ERROR",
            ProxyError::Internal(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            ProxyError::MethodNotAllowed { .. }
            | ProxyError::InvalidJson { .. }
            | ProxyError::InvalidPrompt { .. }
            | ProxyError::PromptTooLong { .. }
            | ProxyError::BodyTooLarge { .. } => ErrorType::Validation,
            ProxyError::MissingApiKey => ErrorType::Configuration,
            ProxyError::NoCandidates { .. } | ProxyError::InvalidResponseFormat { .. } => {
                ErrorType::ApiResponse
            }
            ProxyError::UpstreamStatus { .. } => ErrorType::ExternalApi,
            ProxyError::Timeout { .. } => ErrorType::Timeout,
            ProxyError::Network { .. } => ErrorType::Connectivity,
            ProxyError::Internal(_) => ErrorType::Server,
        }
    }

    /// Short message shown to the end user.
    fn message(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed { .. } => "Method not allowed. Use POST.",
            ProxyError::InvalidJson { .. } => "Invalid JSON in request body",
            ProxyError::InvalidPrompt { .. } => {
                "Prompt is required and must be a non-empty string"
            }
            ProxyError::PromptTooLong { .. } | ProxyError::BodyTooLarge { .. } => {
                "Prompt is too long. Maximum length is 10,000 characters."
            }
            ProxyError::MissingApiKey => {
                "Server configuration error. Please contact the administrator."
            }
            ProxyError::NoCandidates { .. } => "No response generated from Gemini API",
            ProxyError::InvalidResponseFormat { .. } => "Invalid response format from Gemini API",
            ProxyError::UpstreamStatus { status, .. } => match status {
                429 => "Rate limit exceeded. Please try again later.",
                403 => "API access forbidden. Please check API key configuration.",
                400 => "Bad request to Gemini API",
                404 => "Gemini API endpoint not found",
                s if *s >= 500 => "Gemini API server error",
                _ => "Failed to process request with Gemini API",
            },
            ProxyError::Timeout { .. } => {
                "Request timeout. Please try again with a shorter prompt."
            }
            ProxyError::Network { .. } => "Unable to connect to Gemini API",
            ProxyError::Internal(_) => "Internal server error. Please try again later.",
        }
    }

    /// Remediation hint for the client. Stable per error code.
    pub fn suggestion(&self) -> &'static str {
        match self {
            ProxyError::MethodNotAllowed { .. } => {
                "Please use POST method to send your prompt to the API."
            }
            ProxyError::InvalidJson { .. } => {
                "Please ensure your request body contains valid JSON with a \"prompt\" field."
            }
            ProxyError::InvalidPrompt { .. } => {
                "Please provide a valid prompt string with at least one character."
            }
            ProxyError::PromptTooLong { .. } | ProxyError::BodyTooLarge { .. } => {
                "Please shorten your prompt to under 10,000 characters."
            }
            ProxyError::MissingApiKey => {
                "The server administrator needs to configure the Gemini API key in the environment variables."
            }
            ProxyError::NoCandidates { .. } => {
                "The AI model did not generate a response. Try rephrasing your prompt or try again later."
            }
            ProxyError::InvalidResponseFormat { .. } => {
                "The AI response was in an unexpected format. Please try again."
            }
            ProxyError::UpstreamStatus { status, .. } => match status {
                429 => "You have made too many requests. Please wait a few minutes before trying again.",
                403 => "The API key may be invalid or expired. Please contact the administrator.",
                400 => "Your prompt may contain unsupported content. Try rephrasing your request.",
                404 => "The AI service endpoint is not available. Please contact the administrator.",
                s if *s >= 500 => "The AI service is experiencing issues. Please try again later.",
                _ => "There was an issue with the AI service. Please try again later.",
            },
            ProxyError::Timeout { .. } => {
                "Your request took too long to process. Try with a shorter prompt or try again later."
            }
            ProxyError::Network { .. } => {
                "There seems to be a network connectivity issue. Please try again later."
            }
            ProxyError::Internal(_) => {
                "An unexpected error occurred on the server. Please try again or contact support if the issue persists."
            }
        }
    }

    /// Structured diagnostics. `diagnostics` adds the full error chain to
    /// internal failures and must stay off in production.
    fn details(&self, diagnostics: bool) -> Map<String, Value> {
        let value = match self {
            ProxyError::MethodNotAllowed { received } => json!({
                "allowedMethods": ["POST", "OPTIONS"],
                "receivedMethod": received,
            }),
            ProxyError::InvalidJson {
                parse_error,
                received_body,
            } => json!({
                "parseError": parse_error,
                "receivedBody": received_body,
            }),
            ProxyError::InvalidPrompt {
                prompt_type,
                prompt_length,
                is_empty,
            } => json!({
                "promptType": prompt_type,
                "promptLength": prompt_length,
                "isEmpty": is_empty,
            }),
            ProxyError::PromptTooLong { prompt_length } => json!({
                "promptLength": prompt_length,
                "maxLength": MAX_PROMPT_CHARS,
                "exceededBy": prompt_length.saturating_sub(MAX_PROMPT_CHARS),
            }),
            ProxyError::BodyTooLarge { limit_bytes } => json!({
                "maxLength": MAX_PROMPT_CHARS,
                "maxBodyBytes": limit_bytes,
            }),
            ProxyError::MissingApiKey => json!({
                "configurationIssue": "GEMINI_API_KEY environment variable not configured",
                "timestamp": timestamp_now(),
            }),
            ProxyError::NoCandidates {
                response_data,
                candidates_length,
            } => json!({
                "responseData": response_data,
                "candidatesLength": candidates_length,
                "timestamp": timestamp_now(),
            }),
            ProxyError::InvalidResponseFormat { candidate } => json!({
                "candidate": candidate,
                "timestamp": timestamp_now(),
            }),
            ProxyError::UpstreamStatus { status, body } => {
                let mut details = json!({
                    "httpStatus": status,
                    "apiError": upstream_message(body),
                    "timestamp": timestamp_now(),
                });
                match status {
                    429 => details["retryAfter"] = json!("5 minutes"),
                    400 => {
                        details["requestIssue"] = body
                            .pointer("/error/details")
                            .filter(|d| !d.is_null())
                            .cloned()
                            .unwrap_or_else(|| json!("Invalid request format"))
                    }
                    _ => {}
                }
                details
            }
            ProxyError::Timeout { after } => json!({
                "timeoutDuration": describe_duration(*after),
                "timestamp": timestamp_now(),
            }),
            ProxyError::Network { kind, message } => json!({
                "networkError": kind,
                "message": message,
                "timestamp": timestamp_now(),
            }),
            ProxyError::Internal(err) => {
                let mut details = json!({
                    "errorMessage": err.to_string(),
                    "timestamp": timestamp_now(),
                });
                if diagnostics {
                    details["errorStack"] = json!(format!("{:?}", err));
                }
                details
            }
        };

        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    pub fn descriptor(&self, diagnostics: bool) -> ErrorDescriptor {
        ErrorDescriptor {
            error: self.message().to_string(),
            error_code: self.error_code().to_string(),
            error_type: self.error_type(),
            details: self.details(diagnostics),
            suggestion: self.suggestion().to_string(),
        }
    }

    pub fn into_response(self, diagnostics: bool) -> OutgoingResponse {
        OutgoingResponse::error(self.status_code(), &self.descriptor(diagnostics))
    }
}

/// `error.message` from an upstream error body.
fn upstream_message(body: &Value) -> String {
    body.pointer("/error/message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .unwrap_or("Gemini API error")
        .to_string()
}

fn describe_duration(duration: Duration) -> String {
    match duration.as_secs() {
        0 => format!("{} milliseconds", duration.as_millis()),
        1 => "1 second".to_string(),
        secs => format!("{} seconds", secs),
    }
}
