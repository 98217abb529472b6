//! The request translation pipeline: validate, call upstream, normalize.

use super::error::ProxyError;
use crate::models::request::js_type_name;
use crate::models::{
    prompt_len, IncomingRequest, OutgoingResponse, PromptPayload, SuccessBody, MAX_PROMPT_CHARS,
};
use crate::services::providers::{candidate_text, GenerateContentRequest, GenerateContentResponse};
use crate::services::UpstreamClient;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use std::sync::Arc;

/// Characters of a rejected body echoed back for diagnostics.
const BODY_ECHO_CHARS: usize = 100;

/// Turns one [`IncomingRequest`] into exactly one [`OutgoingResponse`].
///
/// Holds only immutable configuration, so a single instance is shared by all
/// concurrent requests.
#[derive(Clone)]
pub struct ProxyHandler {
    upstream: Arc<dyn UpstreamClient>,
    api_key: Option<Secret<String>>,
    diagnostics: bool,
}

impl ProxyHandler {
    pub fn new(upstream: Arc<dyn UpstreamClient>, api_key: Option<Secret<String>>) -> Self {
        // An empty key is as good as none.
        let api_key = api_key.filter(|k| !k.expose_secret().trim().is_empty());
        Self {
            upstream,
            api_key,
            diagnostics: false,
        }
    }

    /// Include error chains in internal-error details.
    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    #[tracing::instrument(skip_all, fields(method = %request.http_method))]
    pub async fn handle(&self, request: IncomingRequest) -> OutgoingResponse {
        if request.is_preflight() {
            return OutgoingResponse::preflight();
        }

        match self.process(&request).await {
            Ok(body) => OutgoingResponse::success(&body),
            Err(err) => self.fail(err),
        }
    }

    /// Answer a request whose body could not be read.
    ///
    /// Preflight and the method gate still take precedence over `err`.
    #[tracing::instrument(skip_all, fields(method = %http_method))]
    pub fn reject_body(&self, http_method: &str, err: ProxyError) -> OutgoingResponse {
        let request = IncomingRequest::new(http_method, None);
        if request.is_preflight() {
            return OutgoingResponse::preflight();
        }
        if !request.is_post() {
            return self.fail(ProxyError::MethodNotAllowed {
                received: request.http_method,
            });
        }
        self.fail(err)
    }

    fn fail(&self, err: ProxyError) -> OutgoingResponse {
        let status = err.status_code();
        if status.is_server_error() {
            tracing::error!(
                error_code = err.error_code(),
                status = status.as_u16(),
                error = %err,
                "Proxy request failed"
            );
        } else {
            tracing::warn!(
                error_code = err.error_code(),
                status = status.as_u16(),
                error = %err,
                "Proxy request rejected"
            );
        }
        err.into_response(self.diagnostics)
    }

    async fn process(&self, request: &IncomingRequest) -> Result<SuccessBody, ProxyError> {
        if !request.is_post() {
            return Err(ProxyError::MethodNotAllowed {
                received: request.http_method.clone(),
            });
        }

        let payload = parse_prompt(request.body.as_deref())?;
        let api_key = self.api_key.as_ref().ok_or(ProxyError::MissingApiKey)?;

        let upstream_request = GenerateContentRequest::for_prompt(payload.text());
        tracing::info!(
            prompt_len = prompt_len(payload.text()),
            "Making request to Gemini API"
        );

        let body = self
            .upstream
            .generate_content(api_key, &upstream_request)
            .await
            .map_err(|e| ProxyError::from_upstream(e, self.upstream.timeout()))?;

        extract_text(body).map(SuccessBody::new)
    }
}

/// Parse and validate the inbound body into a trimmed prompt.
pub fn parse_prompt(body: Option<&str>) -> Result<PromptPayload, ProxyError> {
    let raw = body.unwrap_or_default();
    let value: Value = serde_json::from_str(raw).map_err(|e| ProxyError::InvalidJson {
        parse_error: e.to_string(),
        received_body: echo_body(body),
    })?;

    let prompt = value.get("prompt");
    let text = match prompt {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
        _ => {
            return Err(ProxyError::InvalidPrompt {
                prompt_type: js_type_name(prompt),
                prompt_length: prompt.and_then(Value::as_str).map(prompt_len).unwrap_or(0),
                is_empty: prompt
                    .and_then(Value::as_str)
                    .map_or(true, |s| s.trim().is_empty()),
            })
        }
    };

    if prompt_len(text) > MAX_PROMPT_CHARS {
        // Reported length is the untrimmed one.
        let raw = prompt.and_then(Value::as_str).unwrap_or(text);
        return Err(ProxyError::PromptTooLong {
            prompt_length: prompt_len(raw),
        });
    }

    Ok(PromptPayload {
        prompt: text.to_string(),
    })
}

fn echo_body(body: Option<&str>) -> String {
    match body {
        Some(b) if !b.is_empty() => {
            let head: String = b.chars().take(BODY_ECHO_CHARS).collect();
            format!("{}...", head)
        }
        _ => "empty".to_string(),
    }
}

/// Pull the first candidate's text out of an upstream body.
pub fn extract_text(body: Value) -> Result<String, ProxyError> {
    let response = GenerateContentResponse::from_value(&body);
    let Some(first) = response.candidates().first() else {
        return Err(ProxyError::NoCandidates {
            candidates_length: 0,
            response_data: body,
        });
    };

    candidate_text(first).ok_or_else(|| ProxyError::InvalidResponseFormat {
        candidate: first.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::MockUpstream;
    use crate::services::UpstreamError;
    use serde_json::json;

    fn handler(mock: MockUpstream) -> (ProxyHandler, Arc<MockUpstream>) {
        let mock = Arc::new(mock);
        let handler = ProxyHandler::new(mock.clone(), Some(Secret::new("test-key".to_string())));
        (handler, mock)
    }

    fn body(res: &OutgoingResponse) -> Value {
        serde_json::from_str(&res.body).unwrap()
    }

    #[tokio::test]
    async fn options_short_circuits() {
        let (handler, mock) = handler(MockUpstream::new());
        let res = handler.handle(IncomingRequest::new("OPTIONS", None)).await;

        assert_eq!(res.status_code, 200);
        assert!(res.body.is_empty());
        assert_eq!(res.header("Access-Control-Allow-Methods"), Some("POST, OPTIONS"));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn other_methods_are_rejected() {
        let (handler, _) = handler(MockUpstream::new());
        for method in ["GET", "PUT", "DELETE", "PATCH", "HEAD"] {
            let res = handler.handle(IncomingRequest::new(method, None)).await;
            assert_eq!(res.status_code, 405, "{method}");
            let body = body(&res);
            assert_eq!(body["errorCode"], "METHOD_NOT_ALLOWED");
            assert_eq!(body["details"]["receivedMethod"], method);
            assert_eq!(res.header("Access-Control-Allow-Origin"), Some("*"));
        }
    }

    #[tokio::test]
    async fn malformed_json_is_invalid_json() {
        let (handler, _) = handler(MockUpstream::new());
        let long = format!("{{{}", "x".repeat(300));
        for raw in ["{", "not json", "{\"prompt\": }", long.as_str()] {
            let res = handler.handle(IncomingRequest::post(raw)).await;
            assert_eq!(res.status_code, 400);
            let body = body(&res);
            assert_eq!(body["errorCode"], "INVALID_JSON");
            assert_eq!(body["errorType"], "validation");
        }

        let res = handler.handle(IncomingRequest::post(long.clone())).await;
        let echoed = body(&res)["details"]["receivedBody"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(echoed, format!("{}...", &long[..100]));
    }

    #[tokio::test]
    async fn missing_body_is_invalid_json() {
        let (handler, _) = handler(MockUpstream::new());
        let res = handler.handle(IncomingRequest::new("POST", None)).await;
        assert_eq!(res.status_code, 400);
        let body = body(&res);
        assert_eq!(body["errorCode"], "INVALID_JSON");
        assert_eq!(body["details"]["receivedBody"], "empty");
    }

    #[tokio::test]
    async fn bad_prompts_are_invalid_prompt() {
        let (handler, mock) = handler(MockUpstream::new());
        let cases = [
            (json!({}), "undefined"),
            (json!({"prompt": ""}), "string"),
            (json!({"prompt": "   \n\t"}), "string"),
            (json!({"prompt": 42}), "number"),
            (json!({"prompt": null}), "object"),
            (json!({"prompt": ["a"]}), "object"),
            (json!("just a string"), "undefined"),
        ];

        for (payload, expected_type) in cases {
            let res = handler.handle(IncomingRequest::post(payload.to_string())).await;
            assert_eq!(res.status_code, 400, "{payload}");
            let body = body(&res);
            assert_eq!(body["errorCode"], "INVALID_PROMPT", "{payload}");
            assert_eq!(body["details"]["promptType"], expected_type, "{payload}");
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn long_prompts_report_excess() {
        let (handler, _) = handler(MockUpstream::new());
        let prompt = "a".repeat(10_042);
        let res = handler
            .handle(IncomingRequest::post(json!({ "prompt": prompt }).to_string()))
            .await;

        assert_eq!(res.status_code, 400);
        let body = body(&res);
        assert_eq!(body["errorCode"], "PROMPT_TOO_LONG");
        assert_eq!(body["details"]["exceededBy"], 42);
        assert_eq!(body["details"]["promptLength"], 10_042);
    }

    #[tokio::test]
    async fn long_prompt_excess_counts_surrounding_whitespace() {
        let (handler, _) = handler(MockUpstream::new());
        let prompt = format!("{}   ", "a".repeat(10_001));
        let res = handler
            .handle(IncomingRequest::post(json!({ "prompt": prompt }).to_string()))
            .await;

        assert_eq!(res.status_code, 400);
        let body = body(&res);
        assert_eq!(body["errorCode"], "PROMPT_TOO_LONG");
        assert_eq!(body["details"]["promptLength"], 10_004);
        assert_eq!(body["details"]["exceededBy"], 4);
    }

    #[tokio::test]
    async fn whitespace_padding_alone_does_not_trip_the_limit() {
        let (handler, _) = handler(MockUpstream::replying("ok"));
        let prompt = format!("{}{}", "a".repeat(9_990), " ".repeat(50));
        let res = handler
            .handle(IncomingRequest::post(json!({ "prompt": prompt }).to_string()))
            .await;
        assert_eq!(res.status_code, 200);
    }

    #[tokio::test]
    async fn astral_characters_count_as_two_units() {
        let (handler, mock) = handler(MockUpstream::new());
        let prompt = "😀".repeat(6_000);
        let res = handler
            .handle(IncomingRequest::post(json!({ "prompt": prompt }).to_string()))
            .await;

        assert_eq!(res.status_code, 400);
        let body = body(&res);
        assert_eq!(body["errorCode"], "PROMPT_TOO_LONG");
        assert_eq!(body["details"]["promptLength"], 12_000);
        assert_eq!(body["details"]["exceededBy"], 2_000);
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn unreadable_body_still_honors_preflight_and_method_gate() {
        let (handler, _) = handler(MockUpstream::new());
        let err = || ProxyError::BodyTooLarge {
            limit_bytes: 1024,
        };

        let res = handler.reject_body("OPTIONS", err());
        assert_eq!(res.status_code, 200);
        assert!(res.body.is_empty());

        let res = handler.reject_body("PUT", err());
        assert_eq!(res.status_code, 405);

        let res = handler.reject_body("POST", err());
        assert_eq!(res.status_code, 400);
        assert_eq!(body(&res)["errorCode"], "PROMPT_TOO_LONG");
        assert_eq!(res.header("Access-Control-Allow-Origin"), Some("*"));
    }

    #[tokio::test]
    async fn exactly_max_length_is_accepted_after_trim() {
        let (handler, mock) = handler(MockUpstream::replying("ok"));
        let prompt = format!("  {}  ", "b".repeat(10_000));
        let res = handler
            .handle(IncomingRequest::post(json!({ "prompt": prompt }).to_string()))
            .await;

        assert_eq!(res.status_code, 200);
        let calls = mock.calls();
        assert_eq!(
            calls[0].1.contents[0].parts[0].text.as_deref().map(str::len),
            Some(10_000)
        );
    }

    #[tokio::test]
    async fn missing_key_is_configuration_error() {
        let mock = Arc::new(MockUpstream::new());
        for key in [None, Some(Secret::new(String::new()))] {
            let handler = ProxyHandler::new(mock.clone(), key);
            let res = handler
                .handle(IncomingRequest::post(r#"{"prompt":"hi"}"#))
                .await;

            assert_eq!(res.status_code, 500);
            let body = body(&res);
            assert_eq!(body["errorCode"], "MISSING_API_KEY");
            assert_eq!(body["errorType"], "configuration");
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn success_returns_text_and_timestamp() {
        let (handler, mock) = handler(MockUpstream::replying("Hello"));
        let res = handler
            .handle(IncomingRequest::post(r#"{"prompt":"  Say hi  "}"#))
            .await;

        assert_eq!(res.status_code, 200);
        assert_eq!(res.header("Content-Type"), Some("application/json"));
        let body = body(&res);
        assert_eq!(body["response"], "Hello");
        let ts = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "test-key");
        assert_eq!(calls[0].1, GenerateContentRequest::for_prompt("Say hi"));
    }

    #[tokio::test]
    async fn empty_candidates_is_no_candidates() {
        let mock = MockUpstream::new();
        mock.push(Ok(json!({"candidates": []})));
        let (handler, _) = handler(mock);

        let res = handler.handle(IncomingRequest::post(r#"{"prompt":"hi"}"#)).await;
        assert_eq!(res.status_code, 500);
        let body = body(&res);
        assert_eq!(body["errorCode"], "NO_CANDIDATES");
        assert_eq!(body["details"]["candidatesLength"], 0);
    }

    #[tokio::test]
    async fn candidate_without_text_is_invalid_format() {
        let mock = MockUpstream::new();
        mock.push(Ok(json!({"candidates": [{"finishReason": "SAFETY"}]})));
        let (handler, _) = handler(mock);

        let res = handler.handle(IncomingRequest::post(r#"{"prompt":"hi"}"#)).await;
        assert_eq!(res.status_code, 500);
        let body = body(&res);
        assert_eq!(body["errorCode"], "INVALID_RESPONSE_FORMAT");
        assert_eq!(body["details"]["candidate"]["finishReason"], "SAFETY");
    }

    #[tokio::test]
    async fn first_part_text_wins_over_malformed_siblings() {
        let mock = MockUpstream::new();
        mock.push(Ok(json!({
            "candidates": [{"content": {"parts": [{"text": "Hello"}, {"text": 5}]}}]
        })));
        let (handler, _) = handler(mock);

        let res = handler.handle(IncomingRequest::post(r#"{"prompt":"hi"}"#)).await;
        assert_eq!(res.status_code, 200);
        assert_eq!(body(&res)["response"], "Hello");
    }

    #[tokio::test]
    async fn upstream_failures_are_normalized() {
        let cases = [
            (
                UpstreamError::Status {
                    status: 429,
                    body: json!({"error": {"message": "quota"}}),
                },
                400,
                "RATE_LIMIT_EXCEEDED",
            ),
            (UpstreamError::Timeout, 504, "REQUEST_TIMEOUT"),
            (
                UpstreamError::Network {
                    kind: "ENOTFOUND".to_string(),
                    message: "dns error".to_string(),
                },
                502,
                "NETWORK_ERROR",
            ),
            (
                UpstreamError::Other("body decode failed".to_string()),
                500,
                "INTERNAL_SERVER_ERROR",
            ),
        ];

        for (err, status, code) in cases {
            let (handler, _) = handler(MockUpstream::failing(err));
            let res = handler.handle(IncomingRequest::post(r#"{"prompt":"hi"}"#)).await;
            assert_eq!(res.status_code, status, "{code}");
            let body = body(&res);
            assert_eq!(body["errorCode"], code);
            assert!(body["suggestion"].as_str().is_some_and(|s| !s.is_empty()));
            assert!(body["details"].is_object());
        }
    }

    #[test]
    fn body_echo_truncates_on_char_boundaries() {
        let body = "é".repeat(150);
        let echoed = echo_body(Some(&body));
        assert_eq!(echoed.chars().count(), 103);
        assert_eq!(echo_body(Some("")), "empty");
        assert_eq!(echo_body(None), "empty");
    }
}
