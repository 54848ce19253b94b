//! Schema-validated structured generation.
//!
//! The generator and analyzer stages depend on the LLM returning objects
//! that match a declared schema. This module implements that contract:
//!
//! 1. The JSON Schema of the target type (derived via schemars) is embedded
//!    in the prompt.
//! 2. The response text is searched for a JSON value (raw, fenced, or
//!    embedded) and deserialized into the target type.
//! 3. On parse or validation failure, the model is re-prompted with the
//!    validator's error text, up to a configurable retry budget.
//!
//! Exhausting the budget returns [`StageError::SchemaViolation`], which the
//! orchestrator turns into a failed session.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::error::StageError;
use crate::traits::{CompletionConfig, LlmClientTrait, Message};

/// Options for a structured request.
#[derive(Debug, Clone)]
pub struct StructuredOptions {
    /// System prompt.
    pub system_prompt: Option<String>,
    /// Max tokens for each attempt.
    pub max_tokens: u32,
    /// Sampling temperature (structured output wants it low).
    pub temperature: f32,
    /// Corrective re-prompts allowed after a failed attempt.
    pub retry_budget: u32,
}

impl Default for StructuredOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_tokens: 8192,
            temperature: 0.2,
            retry_budget: 2,
        }
    }
}

impl StructuredOptions {
    /// Create options with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_retry_budget(mut self, retry_budget: u32) -> Self {
        self.retry_budget = retry_budget;
        self
    }

    /// Set max tokens.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Render the JSON Schema of `T` for inclusion in a prompt.
///
/// Falls back to an empty object schema if serialization fails, which in
/// practice cannot happen for schemars-derived types.
#[must_use]
pub fn schema_excerpt<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

/// Request a structured object from the LLM with corrective retries.
///
/// The prompt should already describe the expected JSON shape; this function
/// appends the formal schema and drives the retry loop. The outcome also
/// reports how many attempts were consumed so stages can log retry counts.
///
/// # Errors
///
/// - [`StageError::SchemaViolation`] when all attempts produce output that
///   cannot be parsed into `T`.
/// - [`StageError::ApiUnavailable`] when the underlying client fails.
pub async fn request_structured<T, C>(
    client: &C,
    prompt: &str,
    options: &StructuredOptions,
) -> Result<StructuredOutcome<T>, StageError>
where
    T: DeserializeOwned + JsonSchema,
    C: LlmClientTrait,
{
    let schema = schema_excerpt::<T>();
    let initial = format!(
        "{prompt}\n\nYour reply must be exactly one JSON object valid against this JSON Schema:\n{schema}\n\nReturn the JSON object only, with no surrounding prose."
    );

    let mut messages = vec![Message::user(initial)];
    let mut config = CompletionConfig::new()
        .with_max_tokens(options.max_tokens)
        .with_temperature(options.temperature);
    if let Some(system) = options.system_prompt.as_ref() {
        config = config.with_system_prompt(system);
    }

    let total_attempts = options.retry_budget + 1;
    let mut last_failure = String::new();

    for attempt in 1..=total_attempts {
        let response = client.complete(messages.clone(), config.clone()).await?;

        match parse_structured::<T>(&response.content) {
            Ok(value) => {
                return Ok(StructuredOutcome {
                    value,
                    attempts: attempt,
                })
            }
            Err(reason) => {
                tracing::warn!(attempt, reason = %reason, "Structured output failed validation");
                last_failure = reason.clone();
                messages.push(Message::assistant(response.content));
                messages.push(Message::user(format!(
                    "Your previous output failed validation because: {reason}. \
                     Respond again with only a JSON object matching the schema."
                )));
            }
        }
    }

    Err(StageError::SchemaViolation {
        attempts: total_attempts,
        message: last_failure,
    })
}

/// A validated structured value plus the attempts it took to obtain it.
#[derive(Debug, Clone)]
pub struct StructuredOutcome<T> {
    /// The validated value.
    pub value: T,
    /// Attempts consumed (1 = first try succeeded).
    pub attempts: u32,
}

fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let json = extract_json(text).map_err(|e| e.to_string())?;
    serde_json::from_value(json).map_err(|e| e.to_string())
}

/// Extract JSON from an LLM response, handling multiple formats.
///
/// LLMs may return JSON in different ways:
/// 1. Raw JSON (ideal case)
/// 2. JSON wrapped in markdown json code blocks
/// 3. JSON wrapped in generic code blocks
/// 4. JSON embedded in surrounding prose
///
/// # Errors
///
/// Returns [`StageError::JsonParseFailed`] if no valid JSON can be extracted.
pub fn extract_json(text: &str) -> Result<serde_json::Value, StageError> {
    let trimmed = text.trim();

    // Fast path: try raw JSON parse first
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    if let Some(json_str) = extract_from_code_block(trimmed, "```json") {
        return parse_with_context(&json_str, text);
    }

    if let Some(json_str) = extract_from_code_block(trimmed, "```") {
        return parse_with_context(&json_str, text);
    }

    if let Some(json_str) = find_json_in_text(trimmed) {
        return parse_with_context(&json_str, text);
    }

    let preview = truncate_for_preview(text, 100);
    Err(StageError::JsonParseFailed {
        message: format!("No valid JSON found in response: {preview}"),
    })
}

fn extract_from_code_block(text: &str, prefix: &str) -> Option<String> {
    let start_idx = text.find(prefix)?;
    let remaining = text[start_idx + prefix.len()..].trim_start();
    let end_idx = remaining.find("```")?;
    let json_str = remaining[..end_idx].trim();

    if json_str.is_empty() {
        return None;
    }

    Some(json_str.to_string())
}

fn find_json_in_text(text: &str) -> Option<String> {
    if let Some(obj) = extract_balanced(text, '{', '}') {
        return Some(obj);
    }
    extract_balanced(text, '[', ']')
}

/// Extract content between balanced opening and closing characters,
/// respecting JSON string literals.
fn extract_balanced(text: &str, open: char, close: char) -> Option<String> {
    let start = text.find(open)?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        if ch == '\\' && in_string {
            escape_next = true;
            continue;
        }

        if ch == '"' {
            in_string = !in_string;
            continue;
        }

        if !in_string {
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..=start + i].to_string());
                }
            }
        }
    }

    None
}

fn parse_with_context(json_str: &str, original: &str) -> Result<serde_json::Value, StageError> {
    serde_json::from_str(json_str).map_err(|e| {
        let preview = truncate_for_preview(original, 100);
        StageError::JsonParseFailed {
            message: format!("Failed to parse JSON: {e}. Preview: {preview}"),
        }
    })
}

fn truncate_for_preview(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        text.to_string()
    } else {
        let mut end = max_len;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &text[..end])
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::traits::{CompletionResponse, MockLlmClientTrait, Usage};
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct Demo {
        name: String,
        score: f64,
    }

    #[test]
    fn test_schema_excerpt_mentions_fields() {
        let schema = schema_excerpt::<Demo>();
        assert!(schema.contains("name"));
        assert!(schema.contains("score"));
    }

    #[test]
    fn test_extract_json_raw() {
        let value = extract_json(r#"{"key": "value", "num": 42}"#).unwrap();
        assert_eq!(value["key"], "value");
        assert_eq!(value["num"], 42);
    }

    #[test]
    fn test_extract_json_code_block() {
        let text = "Here's the JSON:\n```json\n{\"key\": \"value\"}\n```\nDone.";
        let value = extract_json(text).unwrap();
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn test_extract_json_generic_code_block() {
        let text = "```\n{\"key\": \"value\"}\n```";
        let value = extract_json(text).unwrap();
        assert_eq!(value["key"], "value");
    }

    #[test]
    fn test_extract_json_embedded_in_text() {
        let text = r#"The result is {"status": "ok", "count": 5} which looks good."#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[test]
    fn test_extract_json_with_string_braces() {
        let text = r#"{"text": "contains { and } braces"}"#;
        let value = extract_json(text).unwrap();
        assert_eq!(value["text"], "contains { and } braces");
    }

    #[test]
    fn test_extract_json_invalid_returns_error() {
        let result = extract_json("This is not JSON at all.");
        let err = result.unwrap_err();
        assert!(matches!(err, StageError::JsonParseFailed { .. }));
        assert!(err.to_string().contains("No valid JSON found"));
    }

    #[test]
    fn test_extract_json_long_error_truncates_preview() {
        let text = "x".repeat(200);
        let err = extract_json(&text).unwrap_err();
        assert!(err.to_string().contains("..."));
    }

    #[tokio::test]
    async fn test_request_structured_first_try() {
        let mut mock = MockLlmClientTrait::new();
        mock.expect_complete().times(1).returning(|_, _| {
            Ok(CompletionResponse::new(
                r#"{"name": "late_delivery", "score": 0.8}"#,
                Usage::new(10, 10),
            ))
        });

        let outcome = request_structured::<Demo, _>(&mock, "Produce a demo", &StructuredOptions::new())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.value.name, "late_delivery");
    }

    #[tokio::test]
    async fn test_request_structured_recovers_after_two_failures() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let mut mock = MockLlmClientTrait::new();
        mock.expect_complete().times(3).returning(move |messages, _| {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            // Corrective retries grow the conversation by two messages each
            assert_eq!(messages.len(), (call as usize) * 2 + 1);
            let content = if call < 2 {
                "not json".to_string()
            } else {
                r#"{"name": "ok", "score": 1.0}"#.to_string()
            };
            Ok(CompletionResponse::new(content, Usage::new(5, 5)))
        });

        let outcome = request_structured::<Demo, _>(&mock, "Produce a demo", &StructuredOptions::new())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.value.name, "ok");
    }

    #[tokio::test]
    async fn test_request_structured_exhausts_budget() {
        let mut mock = MockLlmClientTrait::new();
        mock.expect_complete().times(3).returning(|_, _| {
            Ok(CompletionResponse::new("still not json", Usage::new(5, 5)))
        });

        let result =
            request_structured::<Demo, _>(&mock, "Produce a demo", &StructuredOptions::new()).await;

        match result.unwrap_err() {
            StageError::SchemaViolation { attempts, .. } => assert_eq!(attempts, 3),
            e => panic!("Wrong error type: {e:?}"),
        }
    }

    #[tokio::test]
    async fn test_request_structured_wrong_shape_is_corrected() {
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);

        let mut mock = MockLlmClientTrait::new();
        mock.expect_complete().times(2).returning(move |messages, _| {
            let call = calls_clone.fetch_add(1, Ordering::SeqCst);
            let content = if call == 0 {
                // Valid JSON, wrong shape: the corrective message must
                // carry the serde error
                r#"{"label": "oops"}"#.to_string()
            } else {
                let corrective = &messages[messages.len() - 1].content;
                assert!(corrective.contains("failed validation"));
                r#"{"name": "fixed", "score": 0.5}"#.to_string()
            };
            Ok(CompletionResponse::new(content, Usage::new(5, 5)))
        });

        let outcome = request_structured::<Demo, _>(&mock, "Produce a demo", &StructuredOptions::new())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.value.name, "fixed");
    }

    #[tokio::test]
    async fn test_request_structured_api_error_propagates() {
        let mut mock = MockLlmClientTrait::new();
        mock.expect_complete().returning(|_, _| {
            Err(StageError::ApiUnavailable {
                message: "down".to_string(),
            })
        });

        let result =
            request_structured::<Demo, _>(&mock, "Produce a demo", &StructuredOptions::new()).await;
        assert!(matches!(result, Err(StageError::ApiUnavailable { .. })));
    }
}
