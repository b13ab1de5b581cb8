//! Model adapter contract.
//!
//! Concrete LLM clients (HTTP, SSE, provider SDKs) live outside the core;
//! the step loop only sees [`ModelProvider`]. Tests script the contract with
//! mock providers that replay canned responses.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancel::CancelToken;
use crate::error::AgentResult;
use crate::types::Message;

/// Tool summary included in a model request, as emitted by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the accepted input.
    pub input_schema: Value,
}

/// One model round-trip request: history plus the tools the agent exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub tools: Vec<ToolSpec>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

/// Token accounting reported by the adapter, when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// The assistant message produced by one round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelResponse {
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// The seam between the step loop and a concrete LLM client.
///
/// Implementations must be `Send + Sync`; the loop holds them as
/// `Arc<dyn ModelProvider>`.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Perform one completion round-trip. Must honour `cancel` across any
    /// network await.
    async fn complete(
        &self,
        request: ModelRequest,
        cancel: &CancelToken,
    ) -> AgentResult<ModelResponse>;

    /// Identifier used in error reporting (`MODEL_ERROR` carries it).
    fn model_name(&self) -> &str;
}
