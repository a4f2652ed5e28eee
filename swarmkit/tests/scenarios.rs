//! End-to-end scenarios exercising the chat engine, swarm orchestrator, and workflow driver
//! together, as crate-level integration tests rather than only `#[cfg(test)]` unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use swarm_event::PromptSource;
use swarmkit::agent::{AgentDefinition, AgentInstance};
use swarmkit::context::ContextManager;
use swarmkit::error::{ProviderError, SwarmError};
use swarmkit::hooks::HookRegistry;
use swarmkit::message::{Message, ToolCall, Usage};
use swarmkit::provider::{CompletionRequest, CompletionResponse, ProviderAdapter};
use swarmkit::swarm::{Swarm, SwarmOrchestrator};
use swarmkit::tools::{Tool, ToolRegistry, ToolSourceKind, ToolSpec};

struct ScriptedAdapter {
    responses: std::sync::Mutex<Vec<Result<CompletionResponse, ProviderError>>>,
}

impl ScriptedAdapter {
    fn new(responses: Vec<Result<CompletionResponse, ProviderError>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            panic!("ScriptedAdapter ran out of scripted responses");
        }
        responses.remove(0)
    }
}

fn ok_response(text: &str) -> Result<CompletionResponse, ProviderError> {
    Ok(CompletionResponse {
        message: Message::assistant(text),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
            cached_tokens: 0,
        },
        finish_reason: Some("stop".into()),
        raw: Value::Null,
    })
}

struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "Echo".into(),
            description: "echoes arguments".into(),
            input_schema: json!({"type": "object"}),
        }
    }
    async fn execute(&self, arguments: Value) -> Result<String, SwarmError> {
        Ok(arguments.to_string())
    }
}

/// Scenario: a provider rejects a request with a tool-history error (dangling tool_use
/// blocks); the engine should prune the orphaned calls and retry rather than surfacing the
/// error.
#[tokio::test]
async fn orphan_tool_calls_are_pruned_and_request_is_retried() {
    let adapter = ScriptedAdapter::new(vec![
        Err(ProviderError::ToolHistory {
            message: "tool_use_id not found in conversation".into(),
        }),
        ok_response("recovered"),
    ]);

    let agent = AgentInstance::new(
        "lead",
        AgentDefinition::new("lead", "test-model"),
        ToolRegistry::new(),
        Arc::new(HookRegistry::new()),
        Arc::new(adapter),
    );

    // Seed history with an assistant message carrying an orphaned tool call.
    {
        let mut messages = agent.messages.lock().await;
        messages.push(
            Message::assistant("calling a tool").with_tool_calls(vec![ToolCall {
                id: "tc_orphan".into(),
                name: "Read".into(),
                arguments: json!({"path": "a.rs"}),
            }]),
        );
    }

    let reply = agent.ask("continue".into(), PromptSource::User, false).await.unwrap();
    assert_eq!(reply.content.as_text(), "recovered");
}

/// Scenario: a 401 from the provider is non-retryable; rather than raising out of `ask`, it
/// surfaces as a normal assistant-role reply so a delegating parent can observe it.
#[tokio::test]
async fn non_retryable_error_surfaces_as_assistant_message() {
    let adapter = ScriptedAdapter::new(vec![Err(ProviderError::classify(401, "invalid api key"))]);
    let agent = AgentInstance::new(
        "lead",
        AgentDefinition::new("lead", "test-model"),
        ToolRegistry::new(),
        Arc::new(HookRegistry::new()),
        Arc::new(adapter),
    );

    let reply = agent.ask("hello".into(), PromptSource::User, false).await.unwrap();
    assert!(reply.content.as_text().contains("Unauthorized"));
    assert!(reply.content.as_text().contains("401"));

    let messages = agent.messages.lock().await;
    assert_eq!(messages.iter().filter(|m| m.role == swarmkit::message::Role::Assistant).count(), 1);
}

/// Scenario: once usage crosses 60% of the context window, progressive compression runs
/// exactly once even across multiple turns that remain above the threshold.
#[test]
fn progressive_compression_runs_once_across_threshold_crossings() {
    let mut cm = ContextManager::new(Some(1000));
    let messages = vec![Message::assistant("x").with_usage(Usage {
        input_tokens: 700,
        output_tokens: 0,
        cached_tokens: 0,
    })];
    let (hits_first, compressed_first) = cm.check_thresholds(&messages);
    assert_eq!(hits_first, vec![60]);
    assert!(compressed_first);

    let (hits_second, compressed_second) = cm.check_thresholds(&messages);
    assert!(hits_second.is_empty());
    assert!(!compressed_second);
}

/// Scenario: a delegation tool call runs the target agent's own `ask()` loop and returns its
/// final content as the tool result.
#[tokio::test]
async fn delegation_tool_runs_target_agent_and_returns_its_reply() {
    use swarmkit::delegation::{DelegationManager, DelegationTool, instance_factory};

    let manager = DelegationManager::new();
    let target_adapter = Arc::new(ScriptedAdapter::new(vec![ok_response("delegate reply")]));
    manager
        .register_factory(
            "researcher",
            instance_factory(
                "researcher".into(),
                AgentDefinition::new("researcher", "test-model"),
                ToolRegistry::new(),
                Arc::new(HookRegistry::new()),
                target_adapter,
            ),
        )
        .await;

    let tool = DelegationTool {
        target_agent: "researcher".into(),
        delegator_identity: "lead".into(),
        preserve_context: false,
        shared: false,
        manager: Arc::new(manager),
        tool_name_override: None,
    };

    let result = tool
        .execute(json!({"message": "look into this"}))
        .await
        .unwrap();
    assert_eq!(result, "delegate reply");
}

/// Scenario: `execute()` under a short timeout is cancelled cleanly and reports
/// `ExecutionTimeout` rather than hanging or panicking.
#[tokio::test]
async fn execution_timeout_is_reported_not_hung() {
    struct NeverRespondingAdapter;
    #[async_trait]
    impl ProviderAdapter for NeverRespondingAdapter {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            tokio::time::sleep(std::time::Duration::from_secs(30)).await;
            unreachable!("should have been cancelled before this resolves");
        }
    }

    let lead = Arc::new(AgentInstance::new(
        "lead",
        {
            let mut def = AgentDefinition::new("lead", "test-model");
            def.request_timeout = std::time::Duration::from_millis(50);
            def
        },
        ToolRegistry::new(),
        Arc::new(HookRegistry::new()),
        Arc::new(NeverRespondingAdapter),
    ));

    let swarm = Arc::new(
        Swarm::new("swarm_timeout", "timeout-test", lead)
            .with_execution_timeout(std::time::Duration::from_millis(100)),
    );
    let orchestrator = SwarmOrchestrator::new(swarm);
    let result = orchestrator.execute("hello".into(), true).await;
    assert!(result.is_err());
}

/// Property: tool registry activation never surfaces a tool named in `exclude`, even when
/// it also appears in an explicit `include` list.
#[test]
fn exclude_always_wins_over_include() {
    let mut registry = ToolRegistry::new();
    registry.register(ToolSourceKind::Builtin, Arc::new(EchoTool));
    let active = registry.active_specs(Some(&["Echo".to_string()]), &["Echo".to_string()]);
    assert!(active.is_empty());
}

/// Property: two hook bindings at the same priority run in registration order, verified here
/// via a shared counter instead of the registry's internal sequence numbers.
#[tokio::test]
async fn same_priority_hooks_preserve_registration_order() {
    use swarmkit::hooks::{FnHook, HookAction, HookContext, HookEventKind, Matcher};

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let mut registry = HookRegistry::new();

    let order_a = order.clone();
    registry.register(
        HookEventKind::PreToolUse,
        Matcher::Any,
        5,
        Arc::new(FnHook(move |_: &HookContext| {
            order_a.lock().unwrap().push("a");
            HookAction::Continue
        })),
    );
    let order_b = order.clone();
    registry.register(
        HookEventKind::PreToolUse,
        Matcher::Any,
        5,
        Arc::new(FnHook(move |_: &HookContext| {
            order_b.lock().unwrap().push("b");
            HookAction::Continue
        })),
    );

    let ctx = HookContext {
        agent_name: "lead".into(),
        tool_name: Some("Bash".into()),
        tool_arguments: None,
        prompt: None,
        payload: Value::Null,
    };
    registry.run(HookEventKind::PreToolUse, &ctx).await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
}

/// A tool whose completion order can be controlled independently of call order, to check
/// that tool-result ordering in the conversation follows the assistant's `tool_calls` list
/// rather than completion order.
struct DelayedEchoTool;

#[async_trait]
impl Tool for DelayedEchoTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "DelayedEcho".into(),
            description: "echoes 'label' after sleeping 'delay_ms'".into(),
            input_schema: json!({"type": "object"}),
        }
    }
    async fn execute(&self, arguments: Value) -> Result<String, SwarmError> {
        let delay_ms = arguments["delay_ms"].as_u64().unwrap_or(0);
        tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        Ok(arguments["label"].as_str().unwrap_or("").to_string())
    }
}

/// Scenario: the assistant requests two tool calls in one turn; the first call is made to
/// finish *after* the second. `ask()` must still loop back with both tool results appended in
/// call order, then continue the request cycle and return the model's final reply.
#[tokio::test]
async fn tool_fan_out_preserves_call_order_despite_out_of_order_completion() {
    let tool_call_response = Ok(CompletionResponse {
        message: Message::assistant("running tools").with_tool_calls(vec![
            ToolCall {
                id: "tc_slow".into(),
                name: "DelayedEcho".into(),
                arguments: json!({"label": "first", "delay_ms": 40}),
            },
            ToolCall {
                id: "tc_fast".into(),
                name: "DelayedEcho".into(),
                arguments: json!({"label": "second", "delay_ms": 0}),
            },
        ]),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
            cached_tokens: 0,
        },
        finish_reason: Some("tool_calls".into()),
        raw: Value::Null,
    });

    let adapter = ScriptedAdapter::new(vec![tool_call_response, ok_response("all done")]);

    let mut registry = ToolRegistry::new();
    registry.register(ToolSourceKind::Builtin, Arc::new(DelayedEchoTool));

    let agent = AgentInstance::new(
        "lead",
        AgentDefinition::new("lead", "test-model"),
        registry,
        Arc::new(HookRegistry::new()),
        Arc::new(adapter),
    );

    let reply = agent.ask("go".into(), PromptSource::User, false).await.unwrap();
    assert_eq!(reply.content.as_text(), "all done");

    let messages = agent.messages.lock().await;
    let tool_results: Vec<&Message> = messages
        .iter()
        .filter(|m| m.tool_call_id.is_some())
        .collect();
    assert_eq!(tool_results.len(), 2);
    assert_eq!(tool_results[0].tool_call_id.as_deref(), Some("tc_slow"));
    assert_eq!(tool_results[0].content.as_text(), "first");
    assert_eq!(tool_results[1].tool_call_id.as_deref(), Some("tc_fast"));
    assert_eq!(tool_results[1].content.as_text(), "second");
}

/// Scenario: a streamed turn consumes `content`/`tool_call` chunks and the stream's final
/// `Done` response for its first request, executes the requested tool, then streams a second
/// request whose `Done` response carries no more tool calls, ending the turn.
#[tokio::test]
async fn streaming_turn_consumes_chunks_and_executes_tool_calls_until_done() {
    use swarmkit::provider::StreamChunk;

    struct ScriptedStreamAdapter {
        responses: std::sync::Mutex<Vec<Result<Vec<StreamChunk>, ProviderError>>>,
    }
    #[async_trait]
    impl ProviderAdapter for ScriptedStreamAdapter {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            unreachable!("streaming agent should call stream(), not complete()")
        }
        async fn stream(&self, _request: CompletionRequest) -> Result<Vec<StreamChunk>, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                panic!("ScriptedStreamAdapter ran out of scripted responses");
            }
            responses.remove(0)
        }
    }

    let adapter = ScriptedStreamAdapter {
        responses: std::sync::Mutex::new(vec![
            Ok(vec![
                StreamChunk::Content("thinking out loud".into()),
                StreamChunk::ToolCallDelta {
                    id: "tc1".into(),
                    name: Some("Echo".into()),
                    arguments_delta: "{}".into(),
                },
                StreamChunk::Done(CompletionResponse {
                    message: Message::assistant("thinking out loud").with_tool_calls(vec![ToolCall {
                        id: "tc1".into(),
                        name: "Echo".into(),
                        arguments: json!({}),
                    }]),
                    usage: Usage {
                        input_tokens: 8,
                        output_tokens: 3,
                        cached_tokens: 0,
                    },
                    finish_reason: Some("tool_calls".into()),
                    raw: Value::Null,
                }),
            ]),
            Ok(vec![
                StreamChunk::Content("final answer".into()),
                StreamChunk::Done(CompletionResponse {
                    message: Message::assistant("final answer"),
                    usage: Usage {
                        input_tokens: 12,
                        output_tokens: 4,
                        cached_tokens: 0,
                    },
                    finish_reason: Some("stop".into()),
                    raw: Value::Null,
                }),
            ]),
        ]),
    };

    let mut registry = ToolRegistry::new();
    registry.register(ToolSourceKind::Builtin, Arc::new(EchoTool));

    let mut definition = AgentDefinition::new("lead", "test-model");
    definition.streaming = true;

    let agent = AgentInstance::new(
        "lead",
        definition,
        registry,
        Arc::new(HookRegistry::new()),
        Arc::new(adapter),
    );

    let reply = agent.ask("go".into(), PromptSource::User, false).await.unwrap();
    assert_eq!(reply.content.as_text(), "final answer");
    assert!(reply.tool_calls.is_empty());
}

/// Scenario: two distinct delegators (frontend, backend) each call the same target agent in
/// isolated mode; the manager must create two independent instances with disjoint histories,
/// not share one.
#[tokio::test]
async fn isolated_delegation_creates_disjoint_instances_per_delegator() {
    use swarmkit::delegation::{instance_factory, DelegationManager, DelegationTool};

    // Both isolated instances are created from the same factory and so share one adapter;
    // script two identical responses since both concurrent calls draw from its queue.
    let manager = DelegationManager::new();
    manager
        .register_factory(
            "tester",
            instance_factory(
                "tester".into(),
                AgentDefinition::new("tester", "test-model"),
                ToolRegistry::new(),
                Arc::new(HookRegistry::new()),
                Arc::new(ScriptedAdapter::new(vec![ok_response("analysis done"), ok_response("analysis done")])),
            ),
        )
        .await;
    let manager = Arc::new(manager);

    let frontend_tool = DelegationTool {
        target_agent: "tester".into(),
        delegator_identity: "frontend".into(),
        preserve_context: false,
        shared: false,
        manager: manager.clone(),
        tool_name_override: None,
    };
    let backend_tool = DelegationTool {
        target_agent: "tester".into(),
        delegator_identity: "backend".into(),
        preserve_context: false,
        shared: false,
        manager: manager.clone(),
        tool_name_override: None,
    };

    let (frontend_result, backend_result) = tokio::join!(
        frontend_tool.execute(json!({"message": "analyze"})),
        backend_tool.execute(json!({"message": "analyze"})),
    );
    assert_eq!(frontend_result.unwrap(), "analysis done");
    assert_eq!(backend_result.unwrap(), "analysis done");

    let frontend_instance = manager.resolve("tester", "frontend", false).await.unwrap();
    let backend_instance = manager.resolve("tester", "backend", false).await.unwrap();
    assert_eq!(frontend_instance.identity_name, "tester@frontend");
    assert_eq!(backend_instance.identity_name, "tester@backend");
    assert!(!Arc::ptr_eq(&frontend_instance, &backend_instance));

    let frontend_messages = frontend_instance.messages.lock().await;
    let backend_messages = backend_instance.messages.lock().await;
    assert_eq!(frontend_messages.len(), 2);
    assert_eq!(backend_messages.len(), 2);
}

/// Scenario: two delegators calling into the *same* shared-mode delegate instance
/// concurrently never have their turns interleaved -- the second caller's request cycle
/// only starts once the first has fully completed (spec.md §4.7/§5: "Concurrent calls to
/// the same shared agent are serialized by the agent's per-instance semaphore").
#[tokio::test]
async fn shared_delegate_turns_are_serialized_not_interleaved() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use swarmkit::delegation::{instance_factory, DelegationManager, DelegationTool};

    struct ConcurrencyTrackingAdapter {
        in_flight: AtomicUsize,
        max_observed: AtomicUsize,
    }

    #[async_trait]
    impl ProviderAdapter for ConcurrencyTrackingAdapter {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_observed.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(CompletionResponse {
                message: Message::assistant("shared reply"),
                usage: Usage::default(),
                finish_reason: Some("stop".into()),
                raw: Value::Null,
            })
        }
    }

    let adapter = Arc::new(ConcurrencyTrackingAdapter {
        in_flight: AtomicUsize::new(0),
        max_observed: AtomicUsize::new(0),
    });

    let manager = DelegationManager::new();
    manager
        .register_factory(
            "shared_tester",
            instance_factory(
                "shared_tester".into(),
                AgentDefinition::new("shared_tester", "test-model"),
                ToolRegistry::new(),
                Arc::new(HookRegistry::new()),
                adapter.clone(),
            ),
        )
        .await;
    let manager = Arc::new(manager);

    let frontend_tool = DelegationTool {
        target_agent: "shared_tester".into(),
        delegator_identity: "frontend".into(),
        preserve_context: false,
        shared: true,
        manager: manager.clone(),
        tool_name_override: None,
    };
    let backend_tool = DelegationTool {
        target_agent: "shared_tester".into(),
        delegator_identity: "backend".into(),
        preserve_context: false,
        shared: true,
        manager: manager.clone(),
        tool_name_override: None,
    };

    let (frontend_result, backend_result) = tokio::join!(
        frontend_tool.execute(json!({"message": "analyze frontend"})),
        backend_tool.execute(json!({"message": "analyze backend"})),
    );
    assert_eq!(frontend_result.unwrap(), "shared reply");
    assert_eq!(backend_result.unwrap(), "shared reply");

    assert_eq!(adapter.max_observed.load(Ordering::SeqCst), 1);

    let instance = manager.resolve("shared_tester", "frontend", true).await.unwrap();
    let instance2 = manager.resolve("shared_tester", "backend", true).await.unwrap();
    assert!(Arc::ptr_eq(&instance, &instance2));
    // Both turns landed on the one shared instance's history, in full (no interleaved halves).
    assert_eq!(instance.messages.lock().await.len(), 4);
}

/// Scenario: a workflow node output-transformer loops the node back on itself via
/// `goto_node` until a convergence predicate is met, then halts with the converged content.
#[tokio::test]
async fn workflow_goto_loop_runs_until_halt() {
    use swarmkit::workflow::{ControlSignal, Node, TransformOutcome, Workflow};

    let adapter = Arc::new(ScriptedAdapter::new(vec![
        ok_response("draft 1"),
        ok_response("draft 2"),
        ok_response("draft 3"),
    ]));
    let lead = Arc::new(AgentInstance::new(
        "reviewer",
        AgentDefinition::new("reviewer", "test-model"),
        ToolRegistry::new(),
        Arc::new(HookRegistry::new()),
        adapter,
    ));
    let swarm = Arc::new(Swarm::new("review_swarm", "review", lead));

    let visits = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let visits_for_transform = visits.clone();
    let output_transform: swarmkit::workflow::Transformer = Arc::new(move |ctx| {
        let n = visits_for_transform.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if n < 2 {
            TransformOutcome::Control(ControlSignal::Goto {
                node: "review".to_string(),
                content: ctx.content.clone(),
            })
        } else {
            TransformOutcome::Control(ControlSignal::Halt {
                content: format!("converged: {}", ctx.content),
            })
        }
    });

    let mut node = Node::new("review", swarm);
    node.reset_context = false;
    node.output_transform = Some(output_transform);

    let workflow = Workflow::new("editorial", "review").with_node(node);
    let result = workflow.run("draft the thing".into()).await.unwrap();

    assert_eq!(result, "converged: draft 3");
    assert_eq!(visits.load(std::sync::atomic::Ordering::SeqCst), 3);
}

/// Scenario: every `swarm_start`/`swarm_stop` pair emitted by a workflow node's mini-swarm
/// carries the enclosing workflow execution's `execution_id`, with a hierarchical `swarm_id`
/// (`<workflow>/node:<name>`-shaped) and `parent_swarm_id` set to the outer scope -- spec.md
/// §4.1's identity-inheritance requirement and the §8 testable property that nested
/// mini-swarms inherit the parent's `execution_id`.
#[tokio::test]
async fn workflow_node_execution_inherits_parent_execution_id() {
    use swarm_event::{EventStream, Identity};
    use swarmkit::workflow::{Node, Workflow};

    let adapter = Arc::new(ScriptedAdapter::new(vec![ok_response("node reply")]));
    let lead = Arc::new(AgentInstance::new(
        "worker",
        AgentDefinition::new("worker", "test-model"),
        ToolRegistry::new(),
        Arc::new(HookRegistry::new()),
        adapter,
    ));
    let swarm = Arc::new(Swarm::new("node_swarm", "node", lead));
    let workflow = Workflow::new("pipeline", "solo").with_node(Node::new("solo", swarm));

    let outer_identity = Identity::new("exec_outer_123", "pipeline_top");
    let outer_events = EventStream::new();
    let cancel = tokio_util::sync::CancellationToken::new();

    swarmkit::scheduler::with_scope(outer_identity, outer_events.clone(), cancel, async {
        let result = workflow.run("go".into()).await.unwrap();
        assert_eq!(result, "node reply");
    })
    .await;

    let history = outer_events.history().await;
    let starts: Vec<_> = history
        .iter()
        .filter(|e| e.type_name() == "swarm_start")
        .collect();
    let stops: Vec<_> = history
        .iter()
        .filter(|e| e.type_name() == "swarm_stop")
        .collect();
    assert_eq!(starts.len(), 1);
    assert_eq!(stops.len(), 1);
    for event in starts.iter().chain(stops.iter()) {
        assert_eq!(event.execution_id, "exec_outer_123");
        assert_eq!(event.swarm_id, "pipeline_top/node_swarm");
        assert_eq!(event.parent_swarm_id.as_deref(), Some("pipeline_top"));
    }
}

/// Scenario: `SwarmBuilder` wires a lead agent's delegation binding into a working
/// `WorkWith<Target>` tool backed by a shared `DelegationManager`, and validates topology
/// up front rather than failing lazily mid-execution.
#[tokio::test]
async fn swarm_builder_wires_delegation_tool_end_to_end() {
    use swarmkit::agent::DelegationBinding;
    use swarmkit::swarm::{AgentSpec, SwarmBuilder};

    let lead_adapter: Arc<dyn ProviderAdapter> = Arc::new(ScriptedAdapter::new(vec![ok_response(
        "used WorkWithResearcher",
    )]));
    let researcher_adapter: Arc<dyn ProviderAdapter> =
        Arc::new(ScriptedAdapter::new(vec![ok_response("research findings")]));

    let mut lead_def = AgentDefinition::new("lead", "lead-model");
    lead_def.delegates_to.push(DelegationBinding {
        target_agent: "researcher".into(),
        tool_name: None,
        preserve_context: false,
        shared_across_delegations: false,
    });

    let builder = SwarmBuilder::new("swarm_builder_1", "research-swarm", "lead")
        .with_agent(
            "lead",
            AgentSpec {
                definition: lead_def,
                tools: ToolRegistry::new(),
            },
        )
        .with_agent(
            "researcher",
            AgentSpec {
                definition: AgentDefinition::new("researcher", "researcher-model"),
                tools: ToolRegistry::new(),
            },
        );

    let adapters = std::collections::HashMap::from([
        ("lead-model".to_string(), lead_adapter),
        ("researcher-model".to_string(), researcher_adapter),
    ]);
    let swarm = builder
        .build(move |model| adapters.get(model).cloned().unwrap())
        .await
        .unwrap();

    let tool = swarm
        .lead
        .tools
        .get("WorkWithresearcher")
        .expect("delegation tool should be registered on the lead's tool registry");

    let result = tool
        .execute(json!({"message": "look into rust async runtimes"}))
        .await
        .unwrap();
    assert_eq!(result, "research findings");

    let orchestrator = SwarmOrchestrator::new(Arc::new(swarm));
    let reply = orchestrator.execute("delegate this".into(), true).await.unwrap().unwrap();
    assert_eq!(reply.content.as_text(), "used WorkWithResearcher");
}

/// Property: `SwarmBuilder::build` rejects a delegation binding that targets an agent name
/// not present in the swarm's own roster, rather than deferring the failure to first call.
#[tokio::test]
async fn swarm_builder_rejects_unknown_delegation_target() {
    use swarmkit::agent::DelegationBinding;
    use swarmkit::error::{ConfigError, SwarmError};
    use swarmkit::swarm::{AgentSpec, SwarmBuilder};

    let mut lead_def = AgentDefinition::new("lead", "test-model");
    lead_def.delegates_to.push(DelegationBinding {
        target_agent: "ghost".into(),
        tool_name: None,
        preserve_context: false,
        shared_across_delegations: false,
    });

    let builder = SwarmBuilder::new("swarm_builder_2", "broken-swarm", "lead").with_agent(
        "lead",
        AgentSpec {
            definition: lead_def,
            tools: ToolRegistry::new(),
        },
    );

    let adapter: Arc<dyn ProviderAdapter> = Arc::new(ScriptedAdapter::new(vec![]));
    let err = builder.build(move |_| adapter.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        SwarmError::Config(ConfigError::UnknownDelegationTarget(ref target)) if target == "ghost"
    ));
}

/// Scenario: a tool call whose `path` argument falls outside the agent's file permission
/// allowlist is rejected by the permissions wrapper, surfacing as a tool-result error rather
/// than ever reaching the tool's own `execute`.
#[tokio::test]
async fn permission_denied_path_is_surfaced_as_tool_result_not_executed() {
    use swarmkit::tools::permissions::{FilePermissions, ToolPermissions};

    struct ReadTool;
    #[async_trait]
    impl Tool for ReadTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: "Read".into(),
                description: "reads a file".into(),
                input_schema: json!({"type": "object", "required": ["path"]}),
            }
        }
        async fn execute(&self, _arguments: Value) -> Result<String, SwarmError> {
            panic!("should not execute once permission denied")
        }
    }

    let tool_call_response = Ok(CompletionResponse {
        message: Message::assistant("reading").with_tool_calls(vec![ToolCall {
            id: "tc_read".into(),
            name: "Read".into(),
            arguments: json!({"path": "/etc/passwd"}),
        }]),
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
            cached_tokens: 0,
        },
        finish_reason: Some("tool_calls".into()),
        raw: Value::Null,
    });
    let adapter = ScriptedAdapter::new(vec![tool_call_response, ok_response("done")]);

    let mut registry = ToolRegistry::new();
    registry.register(ToolSourceKind::Builtin, Arc::new(ReadTool));

    let mut definition = AgentDefinition::new("lead", "test-model");
    definition.permissions = ToolPermissions {
        files: FilePermissions::new(&["src/**".to_string()], &[]).unwrap(),
        shell: Default::default(),
    };

    let agent = AgentInstance::new("lead", definition, registry, Arc::new(HookRegistry::new()), Arc::new(adapter));
    let reply = agent.ask("read a file".into(), PromptSource::User, false).await.unwrap();
    assert_eq!(reply.content.as_text(), "done");

    let messages = agent.messages.lock().await;
    let tool_result = messages
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("tc_read"))
        .unwrap();
    assert!(tool_result.content.as_text().contains("not permitted"));
}
