//! Gemini content-generation client.

use super::{GenerateContentRequest, UpstreamClient, UpstreamError};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use std::error::Error as _;
use std::io::ErrorKind;
use std::time::Duration;

/// Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model served by the proxy unless configured otherwise.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_base: String,
    pub model: String,
    pub timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: GEMINI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// reqwest-backed [`UpstreamClient`] for the generateContent endpoint.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Endpoint URL without the credential.
    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// Decode a body as JSON, falling back to a JSON string of the raw text.
fn decode_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Classify a transport failure by what the caller can do about it.
///
/// Only DNS failures and refused connections count as network errors; TLS
/// failures, resets and everything else are reported as `Other`.
fn classify(err: reqwest::Error) -> UpstreamError {
    if err.is_timeout() {
        return UpstreamError::Timeout;
    }

    if err.is_connect() {
        if let Some(kind) = network_error_kind(&err) {
            return UpstreamError::Network {
                kind: kind.to_string(),
                message: err.without_url().to_string(),
            };
        }
    }

    UpstreamError::Other(err.without_url().to_string())
}

/// `ENOTFOUND` or `ECONNREFUSED` if the cause chain shows one.
fn network_error_kind(err: &reqwest::Error) -> Option<&'static str> {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == ErrorKind::ConnectionRefused {
                return Some("ECONNREFUSED");
            }
        }
        // hyper-util's resolver wraps lookup failures as "dns error: ..."
        if cause.to_string().starts_with("dns error") {
            return Some("ENOTFOUND");
        }
        source = cause.source();
    }
    None
}

#[async_trait]
impl UpstreamClient for GeminiClient {
    async fn generate_content(
        &self,
        api_key: &Secret<String>,
        request: &GenerateContentRequest,
    ) -> Result<Value, UpstreamError> {
        tracing::debug!(
            model = %self.config.model,
            timeout_secs = self.config.timeout.as_secs(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", api_key.expose_secret().as_str())])
            .json(request)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status();
        let text = response.text().await.map_err(classify)?;
        let body = decode_body(text);

        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }

    fn timeout(&self) -> Duration {
        self.config.timeout
    }
}
