//! Anthropic API integration.
//!
//! This module provides:
//! - [`AnthropicClient`]: HTTP client for the Messages API with retry logic
//! - [`ClientConfig`]: client configuration with defaults
//! - Request/response types for the Messages API
//! - [`structured`]: schema-validated structured generation with a
//!   corrective retry loop
//!
//! The engine requires exactly one capability from the provider: given a
//! prompt carrying a strict JSON schema, return an object matching that
//! schema. Function calling, vision, and streaming output are not used.

mod client;
mod config;
pub mod structured;
mod types;

pub use client::AnthropicClient;
pub use config::{
    ClientConfig, DEFAULT_BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_MS,
    DEFAULT_TIMEOUT_MS,
};
pub use types::{ApiMessage, ApiRequest, ApiResponse, ApiUsage, ContentBlock, LlmResponse};
