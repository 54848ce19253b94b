//! Trait definitions for mockable dependencies.
//!
//! The pipeline stages talk to the LLM exclusively through
//! [`LlmClientTrait`], which lets tests substitute a mock (mockall) or a
//! scripted stub for the real HTTP client.

use async_trait::async_trait;

use crate::error::StageError;

/// A conversation message passed to the LLM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Role: "user" or "assistant".
    pub role: String,
    /// Message text.
    pub content: String,
}

impl Message {
    /// Create a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Options for a completion request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionConfig {
    /// Maximum tokens to generate (provider default when `None`).
    pub max_tokens: Option<u32>,
    /// Sampling temperature (provider default when `None`).
    pub temperature: Option<f32>,
    /// System prompt.
    pub system_prompt: Option<String>,
}

impl CompletionConfig {
    /// Create an empty completion config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set max tokens.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Usage {
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
}

impl Usage {
    /// Create new usage.
    #[must_use]
    pub const fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Total tokens.
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// A completion response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionResponse {
    /// Response text.
    pub content: String,
    /// Token usage.
    pub usage: Usage,
}

impl CompletionResponse {
    /// Create a new completion response.
    #[must_use]
    pub fn new(content: impl Into<String>, usage: Usage) -> Self {
        Self {
            content: content.into(),
            usage,
        }
    }
}

/// LLM client trait for dependency injection.
///
/// Implemented by [`AnthropicClient`](crate::llm::AnthropicClient) in
/// production and by mocks or scripted stubs in tests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmClientTrait: Send + Sync {
    /// Send a completion request.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::ApiUnavailable`] if the underlying call fails.
    async fn complete(
        &self,
        messages: Vec<Message>,
        config: CompletionConfig,
    ) -> Result<CompletionResponse, StageError>;
}

/// Shared clients work anywhere a client is expected.
#[async_trait]
impl<T: LlmClientTrait> LlmClientTrait for std::sync::Arc<T> {
    async fn complete(
        &self,
        messages: Vec<Message>,
        config: CompletionConfig,
    ) -> Result<CompletionResponse, StageError> {
        self.as_ref().complete(messages, config).await
    }
}
