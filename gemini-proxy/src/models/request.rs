//! Inbound request types.

use serde_json::Value;

/// Maximum accepted prompt length after trimming, in UTF-16 code units.
pub const MAX_PROMPT_CHARS: usize = 10_000;

/// Length of `s` the way a browser's `String.length` reports it.
pub fn prompt_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// A single inbound invocation: the HTTP method and the raw body, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingRequest {
    pub http_method: String,
    pub body: Option<String>,
}

impl IncomingRequest {
    pub fn new(http_method: impl Into<String>, body: Option<String>) -> Self {
        Self {
            http_method: http_method.into(),
            body,
        }
    }

    /// Shorthand for a `POST` carrying a JSON body.
    pub fn post(body: impl Into<String>) -> Self {
        Self::new("POST", Some(body.into()))
    }

    pub fn is_preflight(&self) -> bool {
        self.http_method.eq_ignore_ascii_case("OPTIONS")
    }

    pub fn is_post(&self) -> bool {
        self.http_method.eq_ignore_ascii_case("POST")
    }
}

/// A prompt that passed presence, type and length checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPayload {
    pub prompt: String,
}

impl PromptPayload {
    /// Trimmed prompt text as sent upstream.
    pub fn text(&self) -> &str {
        &self.prompt
    }
}

/// Name of a JSON value's type as a browser client would report it
/// (`typeof` semantics: arrays and `null` are both `"object"`).
pub fn js_type_name(value: Option<&Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::String(_)) => "string",
        Some(Value::Number(_)) => "number",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Null) | Some(Value::Array(_)) | Some(Value::Object(_)) => "object",
    }
}
