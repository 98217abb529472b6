//! Upstream provider abstraction.
//!
//! The handler talks to the content-generation API only through
//! [`UpstreamClient`], so tests can swap the real Gemini client for a
//! scripted mock.

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use secrecy::Secret;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// How an outbound call failed before producing a usable body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    /// The provider answered with a non-success HTTP status.
    #[error("Upstream returned HTTP {status}")]
    Status { status: u16, body: Value },

    #[error("Upstream request timed out")]
    Timeout,

    /// DNS resolution or TCP connect failed.
    #[error("Network error ({kind}): {message}")]
    Network { kind: String, message: String },

    #[error("Upstream error: {0}")]
    Other(String),
}

/// Capability to call the content-generation endpoint once.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Send `request`, returning the decoded response body.
    ///
    /// A success body that is not JSON comes back as a JSON string.
    async fn generate_content(
        &self,
        api_key: &Secret<String>,
        request: &GenerateContentRequest,
    ) -> Result<Value, UpstreamError>;

    /// Configured timeout for a single call.
    fn timeout(&self) -> std::time::Duration;
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

const SAFETY_THRESHOLD: &str = "BLOCK_MEDIUM_AND_ABOVE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
}

impl GenerateContentRequest {
    /// Single-turn request with the fixed generation and safety settings.
    pub fn for_prompt(prompt: &str) -> Self {
        Self {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig::default(),
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: category.to_string(),
                    threshold: SAFETY_THRESHOLD.to_string(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Lenient view over a generateContent response body.
///
/// Every level is optional; anything that fails to decode is treated as
/// absent so that extraction can report *which* part was missing.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Value>>,
}

impl GenerateContentResponse {
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn candidates(&self) -> &[Value] {
        self.candidates.as_deref().unwrap_or_default()
    }
}

/// Text of the first part of a candidate's content, if non-empty.
///
/// Only `content.parts[0].text` is inspected; later parts may be anything.
pub fn candidate_text(candidate: &Value) -> Option<String> {
    candidate
        .pointer("/content/parts/0/text")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}
