//! Scripted upstream for tests.

use super::{GenerateContentRequest, UpstreamClient, UpstreamError};
use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// Upstream that replays queued results and records what it was sent.
///
/// When the queue runs dry it answers with a single "Mock response" candidate.
#[derive(Default)]
pub struct MockUpstream {
    replies: Mutex<VecDeque<Result<Value, UpstreamError>>>,
    calls: Mutex<Vec<(String, GenerateContentRequest)>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that answers every call with `text` as its only candidate.
    pub fn replying(text: &str) -> Self {
        let mock = Self::new();
        mock.push(Ok(Self::candidate_body(text)));
        mock
    }

    /// Mock that fails the next call with `err`.
    pub fn failing(err: UpstreamError) -> Self {
        let mock = Self::new();
        mock.push(Err(err));
        mock
    }

    pub fn push(&self, reply: Result<Value, UpstreamError>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Well-formed generateContent body with one text candidate.
    pub fn candidate_body(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        })
    }

    /// Requests received so far, paired with the key they were sent with.
    pub fn calls(&self) -> Vec<(String, GenerateContentRequest)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl UpstreamClient for MockUpstream {
    async fn generate_content(
        &self,
        api_key: &Secret<String>,
        request: &GenerateContentRequest,
    ) -> Result<Value, UpstreamError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((api_key.expose_secret().clone(), request.clone()));
        }

        let next = self.replies.lock().ok().and_then(|mut r| r.pop_front());
        next.unwrap_or_else(|| Ok(Self::candidate_body("Mock response")))
    }

    fn timeout(&self) -> Duration {
        super::gemini::DEFAULT_TIMEOUT
    }
}
