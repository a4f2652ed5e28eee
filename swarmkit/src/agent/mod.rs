//! Agent definition and chat engine.
//!
//! Recovery from a failed turn happens *within* a single `ask()` call (reprompt after a
//! tool-history error, orphan pruning, hook-driven replace) rather than by re-entering from
//! outside. `ask()` is written as a loop with a consistent per-step shape: validate -> request
//! -> on error classify and recover or bail -> append -> branch on tool calls.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};

use swarm_event::{ChunkType, EventKind, PromptSource, ToolResultMetadata};

use crate::context::ContextManager;
use crate::error::{ProviderError, SwarmError};
use crate::hooks::{HookAction, HookContext, HookEventKind, HookRegistry};
use crate::message::{Message, ToolCall, Usage};
use crate::provider::{CompletionRequest, CompletionResponse, ProviderAdapter, SamplingParams, ThinkingConfig};
use crate::scheduler;
use crate::tools::permissions::ToolPermissions;
use crate::tools::ToolRegistry;

pub const DEFAULT_TOOL_CONCURRENCY: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(600);
pub const MAX_REQUEST_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(15);
/// Orphan-prune retries (§4.3/§4.5) never draw down `MAX_REQUEST_RETRIES`'s shared budget, but
/// still need their own generous bound in case pruning stops making progress (e.g. a provider
/// that keeps rejecting the same history for an unrelated reason).
pub const MAX_ORPHAN_PRUNE_ATTEMPTS: u32 = 20;

/// One delegation binding: which agent this agent can hand off to, and under what tool name.
#[derive(Clone, Debug)]
pub struct DelegationBinding {
    pub target_agent: String,
    pub tool_name: Option<String>,
    pub preserve_context: bool,
    pub shared_across_delegations: bool,
}

/// Static configuration for one agent role.
#[derive(Clone, Debug)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub system_prompt: Option<String>,
    pub included_tools: Option<Vec<String>>,
    pub excluded_tools: Vec<String>,
    pub delegates_to: Vec<DelegationBinding>,
    pub streaming: bool,
    pub thinking: Option<ThinkingConfig>,
    pub sampling: SamplingParams,
    pub request_timeout: Duration,
    pub turn_timeout: Duration,
    /// Fixed delay between retryable-error attempts (§4.5: "retry with fixed delay").
    pub retry_delay: Duration,
    pub max_context_tokens: Option<u64>,
    pub headers: Vec<(String, String)>,
    pub permissions: ToolPermissions,
}

impl AgentDefinition {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
            system_prompt: None,
            included_tools: None,
            excluded_tools: vec![],
            delegates_to: vec![],
            streaming: false,
            thinking: None,
            sampling: SamplingParams::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            turn_timeout: DEFAULT_TURN_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_context_tokens: None,
            headers: vec![],
            permissions: ToolPermissions::default(),
        }
    }

    /// Validates the definition in isolation: config errors fail fast at build time, before
    /// any swarm topology check that needs to see every agent at once.
    pub fn validate(&self) -> Result<(), crate::error::ConfigError> {
        if self.name.contains('@') {
            return Err(crate::error::ConfigError::ReservedName(self.name.clone()));
        }
        if self.request_timeout.is_zero() || self.turn_timeout.is_zero() {
            return Err(crate::error::ConfigError::NonPositiveTimeout(0));
        }
        Ok(())
    }
}

/// An ephemeral note attached by the engine itself (e.g. "first message" instructions),
/// distinct from `ContextManager`'s ephemeral notes which are keyed to message position.
struct EngineState {
    first_message_sent: bool,
}

/// A live, stateful instantiation of an `AgentDefinition`. Delegation creates additional
/// instances named `child@parent` sharing this same type.
pub struct AgentInstance {
    pub identity_name: String,
    pub definition: AgentDefinition,
    pub messages: Mutex<Vec<Message>>,
    pub tools: ToolRegistry,
    pub context: Mutex<ContextManager>,
    pub hooks: Arc<HookRegistry>,
    pub provider: Arc<dyn ProviderAdapter>,
    tool_semaphore: Semaphore,
    /// Capacity-1: a shared delegate instance (one agent, many delegators) serializes whole
    /// turns through this so concurrent `ask()` calls don't interleave `messages` mutations
    /// mid-request-cycle (spec.md §4.7/§5). An isolated delegate's own instance is never
    /// contended here since only its one delegator ever calls it, but the permit is cheap
    /// enough to take unconditionally rather than branching on delegation mode.
    turn_lock: Semaphore,
    engine_state: Mutex<EngineState>,
}

impl AgentInstance {
    pub fn new(
        identity_name: impl Into<String>,
        definition: AgentDefinition,
        tools: ToolRegistry,
        hooks: Arc<HookRegistry>,
        provider: Arc<dyn ProviderAdapter>,
    ) -> Self {
        let max_context_tokens = definition.max_context_tokens;
        Self {
            identity_name: identity_name.into(),
            definition,
            messages: Mutex::new(vec![]),
            tools,
            context: Mutex::new(ContextManager::new(max_context_tokens)),
            hooks,
            provider,
            tool_semaphore: Semaphore::new(DEFAULT_TOOL_CONCURRENCY),
            turn_lock: Semaphore::new(1),
            engine_state: Mutex::new(EngineState {
                first_message_sent: false,
            }),
        }
    }

    /// Aggregate usage snapshot for this instance.
    pub async fn usage(&self) -> Usage {
        let messages = self.messages.lock().await;
        let cm = self.context.lock().await;
        Usage {
            input_tokens: cm.cumulative_input_tokens(&messages),
            output_tokens: cm.cumulative_output_tokens(&messages),
            cached_tokens: 0,
        }
    }

    /// Captures this instance's resumable state: conversation plus context-manager latches.
    /// Ephemeral notes are deliberately not captured (they're notes about the current turn,
    /// not durable history).
    pub async fn to_snapshot(&self) -> crate::snapshot::AgentSnapshot {
        let messages = self.messages.lock().await;
        let cm = self.context.lock().await;
        crate::snapshot::AgentSnapshot {
            identity_name: self.identity_name.clone(),
            messages: messages.clone(),
            compression_applied: cm.compression_applied(),
            threshold_hits: cm.threshold_hits(),
        }
    }

    /// Restores conversation and context-manager latches from a prior `to_snapshot`. Replaces
    /// this instance's current history outright.
    pub async fn restore_snapshot(&self, snapshot: &crate::snapshot::AgentSnapshot) {
        *self.messages.lock().await = snapshot.messages.clone();
        self.context
            .lock()
            .await
            .restore_latch_state(snapshot.compression_applied, &snapshot.threshold_hits);
    }

    /// The full request/response/recovery cycle for one user turn.
    ///
    /// `reset_context`: `Some(true)` clears stored history before the turn; `Some(false)`
    /// forces preservation; `None` defers to the delegation binding's `preserve_context`
    /// default, resolved by the caller.
    pub async fn ask(
        &self,
        prompt: String,
        source: PromptSource,
        reset_context: bool,
    ) -> Result<Message, SwarmError> {
        // Serializes whole turns on this instance (spec.md §4.7/§5): held for the entire
        // method body, so two delegators sharing one instance never interleave request
        // cycles against the same `messages` vector.
        let _turn_permit = self.turn_lock.acquire().await.expect("turn lock never closed");

        if reset_context {
            self.messages.lock().await.clear();
            self.context.lock().await.clear_ephemeral();
        }

        scheduler::emit(EventKind::AgentStart, Some(self.identity_name.clone())).await;

        let hook_ctx = HookContext {
            agent_name: self.identity_name.clone(),
            tool_name: None,
            tool_arguments: None,
            prompt: Some(prompt.clone()),
            payload: Value::Null,
        };
        // `run` itself converts a `Halt` into `Err(HookHaltError)`, which `?` propagates as
        // `SwarmError::Hook`; the other actions (Replace/Reprompt/Finish*) aren't meaningful
        // for `UserPrompt` and are ignored here.
        self.hooks
            .run(HookEventKind::UserPrompt, &hook_ctx)
            .await
            .map_err(SwarmError::from)?;

        let mut user_content = prompt.clone();
        {
            let mut state = self.engine_state.lock().await;
            if !state.first_message_sent {
                user_content = format!(
                    "{user_content}\n\n<system-reminder>This is the first message of the \
                     conversation.</system-reminder>"
                );
                state.first_message_sent = true;
            }
        }

        scheduler::emit(
            EventKind::UserPrompt {
                source,
                prompt: prompt.clone(),
            },
            Some(self.identity_name.clone()),
        )
        .await;

        self.messages.lock().await.push(Message::user(user_content));

        // A turn timeout does not raise out of `ask`: it degrades to an assistant-role
        // message so a delegating parent observes it like any other reply.
        let result = match tokio::time::timeout(self.definition.turn_timeout, self.run_turn()).await {
            Ok(result) => result,
            Err(_) => {
                scheduler::emit(
                    EventKind::TurnTimeout {
                        timeout_seconds: self.definition.turn_timeout.as_secs(),
                    },
                    Some(self.identity_name.clone()),
                )
                .await;
                let message = Message::assistant(format!(
                    "turn timed out after {}s",
                    self.definition.turn_timeout.as_secs()
                ));
                self.messages.lock().await.push(message.clone());
                Ok(message)
            }
        };

        self.context.lock().await.clear_ephemeral();
        scheduler::emit(EventKind::AgentStop, Some(self.identity_name.clone())).await;
        result
    }

    /// Drives the request/act/observe loop until the model stops requesting tools. A
    /// provider error that can't be recovered from within the loop becomes the returned
    /// assistant message rather than an `Err`, per `run_request_cycle`'s contract.
    async fn run_turn(&self) -> Result<Message, SwarmError> {
        loop {
            let assistant = self.run_request_cycle().await?;
            scheduler::emit(EventKind::AgentStep, Some(self.identity_name.clone())).await;

            if assistant.tool_calls.is_empty() {
                return Ok(assistant);
            }

            let tool_results = self.execute_tool_calls(&assistant).await?;
            self.messages.lock().await.extend(tool_results);
        }
    }

    /// Appends `message` as the assistant's turn result and returns it as `Ok` -- used for
    /// every provider failure that the engine recovers from by surfacing a normal reply
    /// (non-retryable errors, retryable errors once their retry budget is spent, and
    /// orphan-prune attempts once *their own* bound is spent) instead of propagating an `Err`
    /// out of `ask()`.
    async fn surface_as_assistant_message(&self, content: String) -> Message {
        let message = Message::assistant(content);
        self.messages.lock().await.push(message.clone());
        message
    }

    async fn run_request_cycle(&self) -> Result<Message, SwarmError> {
        let mut attempt: u32 = 0;
        let mut orphan_prune_attempt: u32 = 0;
        loop {
            let prepared = {
                let messages = self.messages.lock().await;
                let cm = self.context.lock().await;
                cm.prepare_for_llm(&messages)
            };

            {
                let mut cm = self.context.lock().await;
                let messages = self.messages.lock().await;
                let (hits, compressed) = cm.check_thresholds(&messages);
                for threshold in hits {
                    scheduler::emit(
                        EventKind::ContextThresholdHit { threshold },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                }
                if compressed {
                    drop(messages);
                    let messages = self.messages.lock().await;
                    let compressed_messages = cm.compress(&messages);
                    let count = compressed_messages.len();
                    drop(messages);
                    *self.messages.lock().await = compressed_messages;
                    scheduler::emit(
                        EventKind::ContextCompression { compressed_count: count },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                }
            }

            let active_tools = self.tools.active_specs(
                self.definition.included_tools.as_deref(),
                &self.definition.excluded_tools,
            );

            scheduler::emit(
                EventKind::LlmApiRequest {
                    model: self.definition.model.clone(),
                },
                Some(self.identity_name.clone()),
            )
            .await;

            let request = CompletionRequest {
                model: self.definition.model.clone(),
                messages: prepared,
                tools: active_tools,
                sampling: self.definition.sampling.clone(),
                thinking: self.definition.thinking,
                headers: self.definition.headers.clone(),
            };

            let response = if self.definition.streaming {
                match tokio::time::timeout(self.definition.request_timeout, self.provider.stream(request)).await {
                    Ok(Ok(chunks)) => self.consume_stream(chunks).await,
                    Ok(Err(err)) => Err(err),
                    // A single request exceeding its own timeout is a transport-level
                    // failure, not a turn timeout (that wraps the whole `ask`): treat it
                    // like any other retryable I/O error.
                    Err(_) => Err(ProviderError::Retryable {
                        status: None,
                        message: format!("request timed out after {}s", self.definition.request_timeout.as_secs()),
                    }),
                }
            } else {
                match tokio::time::timeout(self.definition.request_timeout, self.provider.complete(request)).await {
                    Ok(response) => response,
                    Err(_) => Err(ProviderError::Retryable {
                        status: None,
                        message: format!("request timed out after {}s", self.definition.request_timeout.as_secs()),
                    }),
                }
            };

            match response {
                Ok(response) => {
                    scheduler::emit(
                        EventKind::LlmApiResponse {
                            streaming: self.definition.streaming,
                            body: response.raw.clone(),
                            status: 200,
                            usage: Some(serde_json::to_value(response.usage).unwrap_or(Value::Null)),
                            model: self.definition.model.clone(),
                            finish_reason: response.finish_reason.clone(),
                        },
                        Some(self.identity_name.clone()),
                    )
                    .await;

                    let assistant = response.message.with_usage(response.usage);
                    self.messages.lock().await.push(assistant.clone());
                    return Ok(assistant);
                }
                Err(ProviderError::ToolHistory { message }) => {
                    scheduler::emit(
                        EventKind::LlmRequestFailed {
                            error_type: "tool_history".into(),
                            retryable: true,
                            message: message.clone(),
                        },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                    let (pruned, removed) = {
                        let messages = self.messages.lock().await;
                        let mut cm = self.context.lock().await;
                        cm.prune_orphans(&messages)
                    };
                    *self.messages.lock().await = pruned;
                    scheduler::emit(
                        EventKind::OrphanToolCallsPruned {
                            pruned_count: removed.len(),
                            details: removed,
                        },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                    // Orphan pruning retries immediately without consuming the shared
                    // request-retry budget (§4.3/§4.5) -- `attempt` is deliberately untouched
                    // here. A separate, much larger bound guards against the degenerate case
                    // where pruning never converges.
                    orphan_prune_attempt += 1;
                    if orphan_prune_attempt > MAX_ORPHAN_PRUNE_ATTEMPTS {
                        let err = ProviderError::ToolHistory { message };
                        return Ok(self.surface_as_assistant_message(err.to_string()).await);
                    }
                    continue;
                }
                Err(err @ ProviderError::Retryable { .. }) => {
                    scheduler::emit(
                        EventKind::LlmRequestFailed {
                            error_type: "retryable".into(),
                            retryable: true,
                            message: err.to_string(),
                        },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                    attempt += 1;
                    if attempt > MAX_REQUEST_RETRIES {
                        return Ok(self.surface_as_assistant_message(err.to_string()).await);
                    }
                    tokio::time::sleep(self.definition.retry_delay).await;
                    continue;
                }
                Err(err @ ProviderError::NonRetryable { .. }) => {
                    scheduler::emit(
                        EventKind::LlmRequestFailed {
                            error_type: "non_retryable".into(),
                            retryable: false,
                            message: err.to_string(),
                        },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                    return Ok(self.surface_as_assistant_message(err.to_string()).await);
                }
            }
        }
    }

    /// Replays a streamed response as `content_chunk` events -- content chunks, a separator
    /// the moment the stream transitions from content to a tool call, `tool_call` chunks for
    /// each delta, and a final `citations` chunk if any were produced -- then returns the
    /// stream's consolidated `Done` response. Callers must not reconstruct tool-call
    /// arguments from the deltas themselves; only the `Done` response's `tool_calls` are
    /// authoritative.
    async fn consume_stream(&self, chunks: Vec<crate::provider::StreamChunk>) -> Result<CompletionResponse, ProviderError> {
        use crate::provider::StreamChunk;

        let mut in_tool_call = false;
        let mut citations_emitted = false;
        let mut done = None;

        for chunk in chunks {
            match chunk {
                StreamChunk::Content(text) => {
                    in_tool_call = false;
                    scheduler::emit(
                        EventKind::ContentChunk {
                            chunk_type: ChunkType::Content,
                            content: text,
                        },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                }
                StreamChunk::ToolCallDelta { id, name, arguments_delta } => {
                    if !in_tool_call {
                        scheduler::emit(
                            EventKind::ContentChunk {
                                chunk_type: ChunkType::Separator,
                                content: String::new(),
                            },
                            Some(self.identity_name.clone()),
                        )
                        .await;
                    }
                    in_tool_call = true;
                    scheduler::emit(
                        EventKind::ContentChunk {
                            chunk_type: ChunkType::ToolCall,
                            content: serde_json::json!({
                                "id": id,
                                "name": name,
                                "arguments_delta": arguments_delta,
                            })
                            .to_string(),
                        },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                }
                StreamChunk::Citations(citations) => {
                    citations_emitted = true;
                    scheduler::emit(
                        EventKind::ContentChunk {
                            chunk_type: ChunkType::Citations,
                            content: citations.join("\n"),
                        },
                        Some(self.identity_name.clone()),
                    )
                    .await;
                }
                StreamChunk::Done(response) => done = Some(response),
            }
        }

        let response = done.ok_or_else(|| ProviderError::NonRetryable {
            error_type: "StreamProtocol".into(),
            status: 0,
            message: "stream ended without a terminal response".into(),
        })?;

        // Citations degrade silently to empty if the adapter never produced a dedicated
        // chunk and the final response carries none either (§4.5).
        if !citations_emitted && !response.message.citations.is_empty() {
            scheduler::emit(
                EventKind::ContentChunk {
                    chunk_type: ChunkType::Citations,
                    content: response.message.citations.join("\n"),
                },
                Some(self.identity_name.clone()),
            )
            .await;
        }

        Ok(response)
    }

    /// Executes every tool call on `message`, respecting per-agent concurrency, hooks, and
    /// parameter validation. Calls run concurrently and may complete in any order, but the
    /// returned tool-result messages are always in the same order as `message.tool_calls`,
    /// since nothing is appended to `self.messages` until every call has finished.
    pub async fn execute_tool_calls(&self, message: &Message) -> Result<Vec<Message>, SwarmError> {
        if message.tool_calls.is_empty() {
            return Ok(vec![]);
        }

        let mut handles = Vec::with_capacity(message.tool_calls.len());
        for call in message.tool_calls.clone() {
            handles.push(self.execute_one_tool_call(call));
        }
        let results = futures::future::join_all(handles).await;

        let mut out = Vec::with_capacity(results.len());
        for result in results {
            out.push(result?);
        }
        Ok(out)
    }

    async fn execute_one_tool_call(&self, call: ToolCall) -> Result<Message, SwarmError> {
        let _permit = self
            .tool_semaphore
            .acquire()
            .await
            .expect("tool semaphore never closed");

        scheduler::emit(
            EventKind::ToolCall {
                tool_call_id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            },
            Some(self.identity_name.clone()),
        )
        .await;

        let hook_ctx = HookContext {
            agent_name: self.identity_name.clone(),
            tool_name: Some(call.name.clone()),
            tool_arguments: Some(call.arguments.clone()),
            prompt: None,
            payload: Value::Null,
        };

        let pre = self
            .hooks
            .run(HookEventKind::PreToolUse, &hook_ctx)
            .await
            .map_err(SwarmError::from)?;

        let (content, is_error) = match pre {
            // `run` already turns `Halt` into `Err(HookHaltError)`, propagated above via `?`.
            HookAction::Halt(_) => unreachable!("HookRegistry::run never returns Ok(Halt)"),
            HookAction::Replace(value) => (value.to_string(), false),
            _ => match self.tools.get(&call.name) {
                None => (format!("tool '{}' not found", call.name), true),
                Some(tool) => {
                    let required = required_parameters(&tool.spec().input_schema);
                    match validate_required_parameters(&call.arguments, &required) {
                        Err(SwarmError::MissingParameter(_, param)) => (
                            format!("missing required parameter '{param}' for tool '{}'", call.name),
                            true,
                        ),
                        Err(err) => (err.to_string(), true),
                        Ok(()) => match self.definition.permissions.check(&call.name, &call.arguments) {
                            Err(err) => (err.to_string(), true),
                            Ok(()) => match tool.execute(call.arguments.clone()).await {
                                Ok(content) => (content, false),
                                Err(err) => (err.to_string(), true),
                            },
                        },
                    }
                }
            },
        };

        scheduler::emit(
            EventKind::ToolResult {
                tool_call_id: call.id.clone(),
                content: content.clone(),
                is_error,
                metadata: read_result_metadata(&call.name, &call.arguments, &content, is_error),
            },
            Some(self.identity_name.clone()),
        )
        .await;

        let post_ctx = HookContext {
            tool_arguments: Some(Value::String(content.clone())),
            ..hook_ctx
        };
        let _ = self.hooks.run(HookEventKind::PostToolUse, &post_ctx).await;

        Ok(Message::tool_result(call.id.clone(), content))
    }
}

/// Builds the `tool_result` event metadata for a completed call: read-style tools (per
/// `context::is_rerunnable_tool`) get a `read_path` (the call's `path` argument, if any) and a
/// `read_digest` of the result content, so event-sourced reconstruction can rebuild which
/// paths an agent has already read and detect when a later read sees different content.
/// Errored calls and non-read tools carry no metadata.
fn read_result_metadata(tool_name: &str, arguments: &Value, content: &str, is_error: bool) -> ToolResultMetadata {
    if is_error || !crate::context::is_rerunnable_tool(tool_name) {
        return ToolResultMetadata::default();
    }
    ToolResultMetadata {
        read_digest: Some(content_digest(content)),
        read_path: arguments.get("path").and_then(Value::as_str).map(str::to_string),
    }
}

/// Cheap non-cryptographic content digest for read-tracking, not integrity or security use.
fn content_digest(content: &str) -> String {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Reads the `required` array out of a JSON-schema `input_schema`, ignoring schemas that
/// don't declare one (an empty requirement list is a valid, permissive schema).
pub fn required_parameters(input_schema: &Value) -> Vec<String> {
    input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Validates that a tool call's arguments contain every required parameter, returning the
/// first missing one.
pub fn validate_required_parameters(arguments: &Value, required: &[String]) -> Result<(), SwarmError> {
    let obj = arguments.as_object();
    for param in required {
        let present = obj.map(|o| o.contains_key(param)).unwrap_or(false);
        if !present {
            return Err(SwarmError::MissingParameter(String::new(), param.clone()));
        }
    }
    Ok(())
}

#[allow(dead_code)]
type ToolParams = HashMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_required_parameters_reports_first_missing() {
        let args = serde_json::json!({"path": "a.rs"});
        let err = validate_required_parameters(&args, &["path".to_string(), "content".to_string()]);
        match err {
            Err(SwarmError::MissingParameter(_, param)) => assert_eq!(param, "content"),
            _ => panic!("expected MissingParameter"),
        }
    }

    #[test]
    fn agent_definition_rejects_at_sign_in_name() {
        let def = AgentDefinition::new("child@parent", "gpt-5");
        assert!(def.validate().is_err());
    }

    #[test]
    fn agent_definition_accepts_plain_name() {
        let def = AgentDefinition::new("researcher", "gpt-5");
        assert!(def.validate().is_ok());
    }

    #[test]
    fn read_result_metadata_captures_path_and_digest_for_rerunnable_tools() {
        let args = serde_json::json!({"path": "src/lib.rs"});
        let meta = read_result_metadata("Read", &args, "fn main() {}", false);
        assert_eq!(meta.read_path.as_deref(), Some("src/lib.rs"));
        assert!(meta.read_digest.is_some());
    }

    #[test]
    fn read_result_metadata_is_empty_for_non_read_tools() {
        let args = serde_json::json!({"command": "ls"});
        let meta = read_result_metadata("Bash", &args, "output", false);
        assert!(meta.read_path.is_none());
        assert!(meta.read_digest.is_none());
    }

    #[test]
    fn read_result_metadata_is_empty_on_error() {
        let args = serde_json::json!({"path": "missing.rs"});
        let meta = read_result_metadata("Read", &args, "not found", true);
        assert!(meta.read_path.is_none());
        assert!(meta.read_digest.is_none());
    }
}
