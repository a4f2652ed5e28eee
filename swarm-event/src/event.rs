//! Event payload types.
//!
//! `EventKind` is the tagged union of every event the runtime emits; `Event` wraps
//! a `EventKind` with the common envelope fields every event carries regardless of
//! kind (execution_id, swarm_id, parent_swarm_id, timestamp, agent).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source of a `user_prompt` event: a human or a delegating parent agent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptSource {
    User,
    Delegation,
}

/// Chunk type carried by a streamed `content_chunk` event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    Content,
    ToolCall,
    Separator,
    Citations,
}

/// Optional metadata attached to a `tool_result` event so event-sourced reconstruction
/// can rebuild read-tracking sets.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolResultMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_path: Option<String>,
}

/// Mode in which an MCP server's tools were initialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpInitMode {
    Discovery,
    Optimized,
}

/// Tagged union of every event kind the runtime can emit.
///
/// `#[serde(tag = "type", rename_all = "snake_case")]` keeps the wire shape a flat
/// `{"type": "...", ...fields}` object per event.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    SwarmStart,
    SwarmStop {
        total_cost: f64,
        total_tokens: u64,
        per_agent_usage: Value,
    },
    AgentStart,
    AgentStop,
    AgentStep,
    UserPrompt {
        source: PromptSource,
        prompt: String,
    },
    LlmApiRequest {
        model: String,
    },
    LlmApiResponse {
        streaming: bool,
        body: Value,
        status: u16,
        usage: Option<Value>,
        model: String,
        finish_reason: Option<String>,
    },
    ContentChunk {
        chunk_type: ChunkType,
        content: String,
    },
    ToolCall {
        tool_call_id: String,
        name: String,
        arguments: Value,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
        metadata: ToolResultMetadata,
    },
    DelegationResult {
        target: String,
        content: String,
    },
    ContextLimitWarning {
        usage_percentage: f64,
    },
    ContextThresholdHit {
        threshold: u8,
    },
    ContextCompression {
        compressed_count: usize,
    },
    OrphanToolCallsPruned {
        pruned_count: usize,
        details: Vec<String>,
    },
    LlmRequestFailed {
        error_type: String,
        retryable: bool,
        message: String,
    },
    ExecutionTimeout {
        timeout_seconds: u64,
    },
    TurnTimeout {
        timeout_seconds: u64,
    },
    McpServerInitStart {
        server: String,
        mode: McpInitMode,
    },
    McpServerInitComplete {
        server: String,
        mode: McpInitMode,
        tool_count: usize,
    },
    AgentLazyInitializationStart {
        instance_name: String,
    },
    AgentLazyInitializationComplete {
        instance_name: String,
    },
}

impl EventKind {
    /// The `type` discriminant as it appears on the wire (snake_case, matches `#[serde(tag)]`).
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::SwarmStart => "swarm_start",
            EventKind::SwarmStop { .. } => "swarm_stop",
            EventKind::AgentStart => "agent_start",
            EventKind::AgentStop => "agent_stop",
            EventKind::AgentStep => "agent_step",
            EventKind::UserPrompt { .. } => "user_prompt",
            EventKind::LlmApiRequest { .. } => "llm_api_request",
            EventKind::LlmApiResponse { .. } => "llm_api_response",
            EventKind::ContentChunk { .. } => "content_chunk",
            EventKind::ToolCall { .. } => "tool_call",
            EventKind::ToolResult { .. } => "tool_result",
            EventKind::DelegationResult { .. } => "delegation_result",
            EventKind::ContextLimitWarning { .. } => "context_limit_warning",
            EventKind::ContextThresholdHit { .. } => "context_threshold_hit",
            EventKind::ContextCompression { .. } => "context_compression",
            EventKind::OrphanToolCallsPruned { .. } => "orphan_tool_calls_pruned",
            EventKind::LlmRequestFailed { .. } => "llm_request_failed",
            EventKind::ExecutionTimeout { .. } => "execution_timeout",
            EventKind::TurnTimeout { .. } => "turn_timeout",
            EventKind::McpServerInitStart { .. } => "mcp_server_init_start",
            EventKind::McpServerInitComplete { .. } => "mcp_server_init_complete",
            EventKind::AgentLazyInitializationStart { .. } => "agent_lazy_initialization_start",
            EventKind::AgentLazyInitializationComplete { .. } => {
                "agent_lazy_initialization_complete"
            }
        }
    }
}
