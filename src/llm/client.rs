//! Anthropic API client with retry logic.
//!
//! This module provides:
//! - HTTP client for the Anthropic Messages API
//! - Retry logic with exponential backoff
//! - Request validation
//! - Response parsing

#![allow(clippy::missing_errors_doc)]

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::config::{ClientConfig, DEFAULT_MAX_TOKENS};
use super::types::{ApiMessage, ApiRequest, ApiResponse, LlmResponse};
use crate::config::SecretString;
use crate::error::{LlmError, StageError};
use crate::traits::{CompletionConfig, CompletionResponse, LlmClientTrait, Message, Usage};

/// Maximum number of messages per request.
pub const MAX_MESSAGES: usize = 50;
/// Maximum content length per message (100KB; prompts carry catalog tables).
pub const MAX_CONTENT_LENGTH: usize = 100_000;

/// Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API client.
#[derive(Debug)]
pub struct AnthropicClient {
    client: Client,
    api_key: SecretString,
    config: ClientConfig,
}

impl AnthropicClient {
    /// Create a new Anthropic client.
    pub fn new(api_key: impl Into<SecretString>, config: ClientConfig) -> Result<Self, LlmError> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::Network {
                message: format!("Failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            config,
        })
    }

    /// Create a client with default configuration.
    pub fn with_api_key(api_key: impl Into<SecretString>) -> Result<Self, LlmError> {
        Self::new(api_key, ClientConfig::default())
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Get the client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a completion request with retry logic.
    pub async fn send(&self, request: ApiRequest) -> Result<LlmResponse, LlmError> {
        Self::validate_request(&request)?;
        self.execute_with_retry(request).await
    }

    /// Validate request size limits.
    fn validate_request(request: &ApiRequest) -> Result<(), LlmError> {
        if request.messages.is_empty() {
            return Err(LlmError::InvalidRequest {
                message: "No messages in request".to_string(),
            });
        }

        if request.messages.len() > MAX_MESSAGES {
            return Err(LlmError::InvalidRequest {
                message: format!(
                    "Too many messages: {} > {}",
                    request.messages.len(),
                    MAX_MESSAGES
                ),
            });
        }

        for msg in &request.messages {
            if msg.content.len() > MAX_CONTENT_LENGTH {
                return Err(LlmError::InvalidRequest {
                    message: format!(
                        "Message too large: {} > {}",
                        msg.content.len(),
                        MAX_CONTENT_LENGTH
                    ),
                });
            }
        }

        Ok(())
    }

    /// Execute request with retry logic.
    async fn execute_with_retry(&self, request: ApiRequest) -> Result<LlmResponse, LlmError> {
        let mut last_error = None;
        let mut delay = self.config.retry_delay_ms;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                tracing::warn!(attempt, delay_ms = delay, "Retrying Anthropic request");
                tokio::time::sleep(Duration::from_millis(delay)).await;
                delay *= 2; // Exponential backoff
            }

            match self.execute_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    if !e.is_retryable() {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, attempt, "Retryable error occurred");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LlmError::Network {
            message: "Unknown error after retries".to_string(),
        }))
    }

    /// Execute a single request attempt.
    async fn execute_once(&self, request: &ApiRequest) -> Result<LlmResponse, LlmError> {
        let url = format!("{}/messages", self.config.base_url);
        let start = std::time::Instant::now();

        tracing::debug!(
            url = %url,
            model = %request.model,
            max_tokens = request.max_tokens,
            timeout_ms = self.config.timeout_ms,
            "Starting Anthropic API request"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
                if e.is_timeout() {
                    tracing::error!(
                        url = %url,
                        elapsed_ms,
                        timeout_ms = self.config.timeout_ms,
                        "Anthropic API request timed out"
                    );
                    LlmError::Timeout {
                        timeout_ms: self.config.timeout_ms,
                    }
                } else {
                    tracing::error!(url = %url, elapsed_ms, error = %e, "Anthropic API request failed");
                    LlmError::Network {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        tracing::debug!(
            url = %url,
            status = %status,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Anthropic API response received"
        );

        if status.as_u16() == 401 {
            return Err(LlmError::AuthenticationFailed);
        }

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited {
                retry_after_seconds: retry_after,
            });
        }

        if status.as_u16() == 529 {
            return Err(LlmError::ModelOverloaded {
                model: request.model.clone(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::UnexpectedResponse {
                message: format!("Status {status}: {body}"),
            });
        }

        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::UnexpectedResponse {
                message: format!("Failed to parse response: {e}"),
            })?;

        Self::parse_response(&body)
    }

    /// Collect text blocks into an [`LlmResponse`].
    fn parse_response(response: &ApiResponse) -> Result<LlmResponse, LlmError> {
        let mut raw_text = String::new();
        for block in &response.content {
            if let Some(text) = block.as_text() {
                if !raw_text.is_empty() {
                    raw_text.push('\n');
                }
                raw_text.push_str(text);
            }
        }

        if raw_text.is_empty() {
            return Err(LlmError::UnexpectedResponse {
                message: "No text content in response".to_string(),
            });
        }

        Ok(LlmResponse::new(raw_text, response.usage.clone()))
    }
}

/// Convert trait types to API types and call the underlying client.
#[async_trait]
impl LlmClientTrait for AnthropicClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        config: CompletionConfig,
    ) -> Result<CompletionResponse, StageError> {
        let api_messages: Vec<ApiMessage> = messages
            .into_iter()
            .map(|m| {
                if m.role == "user" {
                    ApiMessage::user(m.content)
                } else {
                    ApiMessage::assistant(m.content)
                }
            })
            .collect();

        let max_tokens = config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let mut request = ApiRequest::new(&self.config.model, max_tokens, api_messages);

        if let Some(temp) = config.temperature {
            request = request.with_temperature(f64::from(temp));
        }
        if let Some(system) = config.system_prompt.as_ref() {
            request = request.with_system(system);
        }

        let response = self.send(request).await.map_err(|e| StageError::ApiUnavailable {
            message: e.to_string(),
        })?;

        Ok(CompletionResponse::new(
            response.raw_text,
            Usage::new(response.usage.input_tokens, response.usage.output_tokens),
        ))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_client(server: &MockServer) -> AnthropicClient {
        let config = ClientConfig::default()
            .with_base_url(server.uri())
            .with_max_retries(0)
            .with_timeout_ms(5_000);
        AnthropicClient::new("test-api-key", config).unwrap()
    }

    fn success_response_body(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_123",
            "content": [{"type": "text", "text": text}],
            "model": "claude-3",
            "usage": {"input_tokens": 10, "output_tokens": 20},
            "stop_reason": "end_turn"
        })
    }

    #[test]
    fn test_client_new() {
        let client = AnthropicClient::with_api_key("test-key").unwrap();
        assert_eq!(client.base_url(), "https://api.anthropic.com/v1");
    }

    #[tokio::test]
    async fn test_validate_request_empty() {
        let server = MockServer::start().await;
        let client = create_mock_client(&server).await;

        let request = ApiRequest::new("claude-3", 100, vec![]);
        let result = client.send(request).await;

        assert!(matches!(result, Err(LlmError::InvalidRequest { .. })));
    }

    #[tokio::test]
    async fn test_validate_request_message_too_large() {
        let server = MockServer::start().await;
        let client = create_mock_client(&server).await;

        let large = "x".repeat(MAX_CONTENT_LENGTH + 1);
        let request = ApiRequest::new("claude-3", 100, vec![ApiMessage::user(large)]);
        let result = client.send(request).await;

        let err = result.unwrap_err();
        assert!(matches!(err, LlmError::InvalidRequest { .. }));
        assert!(err.to_string().contains("Message too large"));
    }

    #[tokio::test]
    async fn test_send_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "test-api-key"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("Hello!")))
            .mount(&server)
            .await;

        let client = create_mock_client(&server).await;
        let request = ApiRequest::new("claude-3", 1000, vec![ApiMessage::user("Hi")]);

        let response = client.send(request).await.unwrap();
        assert_eq!(response.raw_text, "Hello!");
        assert_eq!(response.usage.input_tokens, 10);
        assert_eq!(response.usage.output_tokens, 20);
    }

    #[tokio::test]
    async fn test_send_skips_thinking_blocks() {
        let server = MockServer::start().await;

        let body = json!({
            "id": "msg_123",
            "content": [
                {"type": "thinking", "thinking": "Let me think..."},
                {"type": "text", "text": "The answer."}
            ],
            "model": "claude-3",
            "usage": {"input_tokens": 10, "output_tokens": 30},
            "stop_reason": "end_turn"
        });

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = create_mock_client(&server).await;
        let request = ApiRequest::new("claude-3", 1000, vec![ApiMessage::user("Think")]);

        let response = client.send(request).await.unwrap();
        assert_eq!(response.raw_text, "The answer.");
    }

    #[tokio::test]
    async fn test_send_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let client = create_mock_client(&server).await;
        let request = ApiRequest::new("claude-3", 1000, vec![ApiMessage::user("Hi")]);

        let result = client.send(request).await;
        assert!(matches!(result, Err(LlmError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_send_rate_limited_with_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(
                ResponseTemplate::new(429)
                    .append_header("retry-after", "30")
                    .set_body_string("Rate limited"),
            )
            .mount(&server)
            .await;

        let client = create_mock_client(&server).await;
        let request = ApiRequest::new("claude-3", 1000, vec![ApiMessage::user("Hi")]);

        match client.send(request).await.unwrap_err() {
            LlmError::RateLimited {
                retry_after_seconds,
            } => assert_eq!(retry_after_seconds, 30),
            e => panic!("Wrong error type: {e:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_model_overloaded() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_string("Overloaded"))
            .mount(&server)
            .await;

        let client = create_mock_client(&server).await;
        let request = ApiRequest::new("claude-sonnet", 1000, vec![ApiMessage::user("Hi")]);

        match client.send(request).await.unwrap_err() {
            LlmError::ModelOverloaded { model } => assert_eq!(model, "claude-sonnet"),
            e => panic!("Wrong error type: {e:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_empty_response_is_error() {
        let server = MockServer::start().await;

        let body = json!({
            "id": "msg_123",
            "content": [],
            "model": "claude-3",
            "usage": {"input_tokens": 10, "output_tokens": 0},
            "stop_reason": "end_turn"
        });

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let client = create_mock_client(&server).await;
        let request = ApiRequest::new("claude-3", 1000, vec![ApiMessage::user("Hi")]);

        let result = client.send(request).await;
        assert!(matches!(result, Err(LlmError::UnexpectedResponse { .. })));
    }

    #[tokio::test]
    async fn test_retry_on_rate_limit_then_success() {
        use std::sync::atomic::{AtomicU32, Ordering};

        let server = MockServer::start().await;
        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = Arc::clone(&call_count);

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(move |_req: &wiremock::Request| {
                let count = call_count_clone.fetch_add(1, Ordering::SeqCst);
                if count == 0 {
                    ResponseTemplate::new(429)
                } else {
                    ResponseTemplate::new(200).set_body_json(success_response_body("Success!"))
                }
            })
            .mount(&server)
            .await;

        let config = ClientConfig::default()
            .with_base_url(server.uri())
            .with_max_retries(1)
            .with_retry_delay_ms(10);

        let client = AnthropicClient::new("test-key", config).unwrap();
        let request = ApiRequest::new("claude-3", 1000, vec![ApiMessage::user("Hi")]);

        let response = client.send(request).await.unwrap();
        assert_eq!(response.raw_text, "Success!");
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_retry_on_auth_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1) // Only called once
            .mount(&server)
            .await;

        let config = ClientConfig::default()
            .with_base_url(server.uri())
            .with_max_retries(3)
            .with_retry_delay_ms(10);

        let client = AnthropicClient::new("test-key", config).unwrap();
        let request = ApiRequest::new("claude-3", 1000, vec![ApiMessage::user("Hi")]);

        let result = client.send(request).await;
        assert!(matches!(result, Err(LlmError::AuthenticationFailed)));
    }

    #[tokio::test]
    async fn test_trait_complete_maps_to_stage_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = create_mock_client(&server).await;
        let result = LlmClientTrait::complete(
            &client,
            vec![Message::user("Hi")],
            CompletionConfig::new(),
        )
        .await;

        assert!(matches!(result, Err(StageError::ApiUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_trait_complete_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_response_body("ok")))
            .mount(&server)
            .await;

        let client = Arc::new(create_mock_client(&server).await);
        let response = client
            .complete(
                vec![Message::user("Hi")],
                CompletionConfig::new()
                    .with_max_tokens(256)
                    .with_temperature(0.2)
                    .with_system_prompt("terse"),
            )
            .await
            .unwrap();

        assert_eq!(response.content, "ok");
        assert_eq!(response.usage.total(), 30);
    }
}
