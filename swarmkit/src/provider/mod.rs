//! Provider adapter: a transport-agnostic interface over a concrete LLM client.
//!
//! A concrete HTTP client is out of scope here; this module defines the contract the chat
//! engine drives and the request/response/streaming shapes.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ProviderError;
use crate::message::{Message, Usage};
use crate::tools::ToolSpec;

#[derive(Clone, Debug, Default)]
pub struct SamplingParams {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<u64>,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ThinkingConfig {
    pub effort: Option<ThinkingEffort>,
    pub budget_tokens: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThinkingEffort {
    Low,
    Medium,
    High,
}

pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSpec>,
    pub sampling: SamplingParams,
    pub thinking: Option<ThinkingConfig>,
    pub headers: Vec<(String, String)>,
}

#[derive(Clone, Debug)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: Usage,
    pub finish_reason: Option<String>,
    pub raw: Value,
}

/// One chunk of a streamed response.
#[derive(Clone, Debug)]
pub enum StreamChunk {
    Content(String),
    ToolCallDelta { id: String, name: Option<String>, arguments_delta: String },
    Citations(Vec<String>),
    Done(CompletionResponse),
}

/// Adapter over a concrete LLM HTTP client.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ProviderError>;

    /// Default streaming implementation: runs `complete` and yields a single `Done` chunk.
    /// Adapters for providers that support SSE/chunked responses override this.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<Vec<StreamChunk>, ProviderError> {
        let response = self.complete(request).await?;
        Ok(vec![StreamChunk::Done(response)])
    }
}
