//! Swarm orchestration: delegation topology plus the top-level `execute()` entry point.
//!
//! A single entry point sets up a fresh scope, runs the lead agent, tears down, and emits
//! start/stop events around the whole thing, using the barrier-with-timeout execution model
//! in `crate::scheduler`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use swarm_event::{EventKind, EventStream, Identity, PromptSource};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentDefinition, AgentInstance};
use crate::delegation::{DelegationManager, DelegationTool};
use crate::error::{ConfigError, SwarmError};
use crate::hooks::HookRegistry;
use crate::message::Message;
use crate::provider::ProviderAdapter;
use crate::scheduler::{self, BarrierOutcome};
use crate::snapshot::{Snapshot, SnapshotSource};
use crate::tools::{ToolRegistry, ToolSourceKind};

pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(1800);

/// A compiled swarm: one lead agent plus every primary agent reachable through the
/// delegation topology.
pub struct Swarm {
    pub id: String,
    pub name: String,
    pub lead: Arc<AgentInstance>,
    pub primary_agents: HashMap<String, Arc<AgentInstance>>,
    pub delegation: Arc<DelegationManager>,
    pub execution_timeout: Duration,
}

impl Swarm {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lead: Arc<AgentInstance>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lead,
            primary_agents: HashMap::new(),
            delegation: Arc::new(DelegationManager::new()),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    pub fn with_primary_agent(mut self, name: impl Into<String>, instance: Arc<AgentInstance>) -> Self {
        self.primary_agents.insert(name.into(), instance);
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Captures every currently-live instance's resumable state: the lead, every primary
    /// agent, and every delegate instance created so far. Instances never lazily created
    /// (an isolated delegate no delegator has called yet) have nothing to capture.
    pub async fn to_snapshot(&self, source: SnapshotSource, created_at: chrono::DateTime<chrono::Utc>) -> Snapshot {
        let mut snapshot = Snapshot::new(self.id.clone(), source, created_at);
        snapshot = snapshot.with_agent(self.lead.to_snapshot().await);
        for instance in self.primary_agents.values() {
            snapshot = snapshot.with_agent(instance.to_snapshot().await);
        }
        for (_, instance) in self.delegation.all_instances().await {
            snapshot = snapshot.with_agent(instance.to_snapshot().await);
        }
        snapshot
    }

    /// Restores `snapshot` onto this swarm: validated against the *current* topology (the
    /// primary agent names this swarm actually has), not the topology the snapshot was taken
    /// against (spec.md §3 "Restoration"). An instance already live (lead, a primary agent, or
    /// an already-created delegate) is restored immediately; an isolated delegate not yet
    /// created is staged in the `DelegationManager` and applied the moment it's first used.
    pub async fn restore_from_snapshot(&self, snapshot: &Snapshot) -> Result<(), SwarmError> {
        let mut current_names: Vec<String> = self.primary_agents.keys().cloned().collect();
        current_names.push(self.lead.identity_name.clone());
        crate::snapshot::validate_against_topology(snapshot, &current_names)
            .map_err(SwarmError::Workflow)?;

        let mut live: HashMap<String, Arc<AgentInstance>> = HashMap::new();
        live.insert(self.lead.identity_name.clone(), self.lead.clone());
        for (name, instance) in &self.primary_agents {
            live.entry(name.clone()).or_insert_with(|| instance.clone());
        }
        for (name, instance) in self.delegation.all_instances().await {
            live.entry(name).or_insert(instance);
        }

        for (name, agent_snapshot) in &snapshot.agents {
            match live.get(name) {
                Some(instance) => instance.restore_snapshot(agent_snapshot).await,
                None => self.delegation.stage_snapshot(name.clone(), agent_snapshot.clone()).await,
            }
        }
        Ok(())
    }
}

/// One agent's static spec going into `SwarmBuilder`: its definition plus the tool registry
/// it starts with, before any delegation tools are wired in.
pub struct AgentSpec {
    pub definition: AgentDefinition,
    pub tools: ToolRegistry,
}

/// Builds a `Swarm` from a flat set of agent specs, wiring each agent's
/// `delegates_to` bindings into an actual `WorkWith<Target>` tool backed by a shared
/// `DelegationManager`, and validating the topology up front (§4.8): every delegation
/// target must name a primary agent in the same swarm, agent names must be unique and
/// `@`-free, and a binding's target must not already appear in a would-be-builder-time
/// cycle among eager (shared) instances.
pub struct SwarmBuilder {
    id: String,
    name: String,
    lead_name: String,
    agents: HashMap<String, AgentSpec>,
    hooks: Arc<HookRegistry>,
    execution_timeout: Duration,
}

impl SwarmBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lead_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lead_name: lead_name.into(),
            agents: HashMap::new(),
            hooks: Arc::new(HookRegistry::new()),
            execution_timeout: DEFAULT_EXECUTION_TIMEOUT,
        }
    }

    pub fn with_agent(mut self, name: impl Into<String>, spec: AgentSpec) -> Self {
        self.agents.insert(name.into(), spec);
        self
    }

    pub fn with_hooks(mut self, hooks: Arc<HookRegistry>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    /// Validates the topology and constructs every primary agent, wiring delegation tools
    /// using `provider_for(model)` to resolve each agent's provider adapter. Shared-mode
    /// delegates are created eagerly here; isolated-mode delegates stay lazy (created by the
    /// `DelegationManager` on first call).
    pub async fn build(
        self,
        provider_for: impl Fn(&str) -> Arc<dyn ProviderAdapter>,
    ) -> Result<Swarm, SwarmError> {
        for (name, spec) in &self.agents {
            spec.definition.validate().map_err(SwarmError::from)?;
            for binding in &spec.definition.delegates_to {
                if !self.agents.contains_key(&binding.target_agent) {
                    return Err(SwarmError::from(ConfigError::UnknownDelegationTarget(
                        binding.target_agent.clone(),
                    )));
                }
            }
            let _ = name;
        }
        if !self.agents.contains_key(&self.lead_name) {
            return Err(SwarmError::from(ConfigError::MissingField(format!(
                "lead agent '{}' is not among the registered agents",
                self.lead_name
            ))));
        }

        let delegation = Arc::new(DelegationManager::new());

        for (name, spec) in &self.agents {
            let factory = build_instance_factory(
                name.clone(),
                spec.definition.clone(),
                spec.tools.clone(),
                self.hooks.clone(),
                provider_for(&spec.definition.model),
                delegation.clone(),
            );
            delegation.register_factory(name, factory).await;
        }

        // Shared-mode delegates are built up front rather than lazily (§3 Lifecycle).
        for spec in self.agents.values() {
            for binding in &spec.definition.delegates_to {
                if binding.shared_across_delegations {
                    delegation.ensure_shared(&binding.target_agent).await?;
                }
            }
        }

        let mut primary_agents = HashMap::new();
        for name in self.agents.keys() {
            let instance = delegation.ensure_shared(name).await?;
            primary_agents.insert(name.clone(), instance);
        }

        let lead = primary_agents
            .get(&self.lead_name)
            .cloned()
            .expect("lead presence checked above");

        Ok(Swarm {
            id: self.id,
            name: self.name,
            lead,
            primary_agents,
            delegation,
            execution_timeout: self.execution_timeout,
        })
    }
}

/// Builds a per-agent instance factory that, given the qualified identity the manager hands
/// it, constructs a tool registry seeded from `base_tools` plus one `WorkWith<Target>` tool
/// per delegation binding -- each bound to `qualified_identity` as its own delegator identity,
/// so a delegate that itself delegates further gets correctly chained naming (`c@b@a`).
fn build_instance_factory(
    _name: String,
    definition: AgentDefinition,
    base_tools: ToolRegistry,
    hooks: Arc<HookRegistry>,
    provider: Arc<dyn ProviderAdapter>,
    delegation: Arc<DelegationManager>,
) -> Arc<dyn Fn(&str) -> Arc<AgentInstance> + Send + Sync> {
    Arc::new(move |qualified_identity: &str| {
        let mut tools = base_tools.clone();
        for binding in &definition.delegates_to {
            let tool = DelegationTool {
                target_agent: binding.target_agent.clone(),
                delegator_identity: qualified_identity.to_string(),
                preserve_context: binding.preserve_context,
                shared: binding.shared_across_delegations,
                manager: delegation.clone(),
                tool_name_override: binding.tool_name.clone(),
            };
            tools.register(ToolSourceKind::Delegation, Arc::new(tool));
        }
        Arc::new(AgentInstance::new(
            qualified_identity.to_string(),
            definition.clone(),
            tools,
            hooks.clone(),
            provider.clone(),
        ))
    })
}

/// Aggregate usage/cost for a finished execution.
#[derive(Clone, Debug, Default)]
pub struct ExecutionUsage {
    pub total_tokens: u64,
    pub total_cost: f64,
    pub per_agent: HashMap<String, crate::message::Usage>,
}

/// A handle to a running (or finished) execution started with `wait = false`. `wait()`
/// returns `None` if the execution was cancelled before completing.
pub struct ExecutionHandle {
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<Result<Message, SwarmError>>,
}

impl ExecutionHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub async fn wait(self) -> Option<Result<Message, SwarmError>> {
        self.join.await.ok()
    }
}

pub struct SwarmOrchestrator {
    pub swarm: Arc<Swarm>,
}

impl SwarmOrchestrator {
    pub fn new(swarm: Arc<Swarm>) -> Self {
        Self { swarm }
    }

    /// Runs `prompt` through the swarm's lead agent under a barrier-with-timeout, with a
    /// fresh execution identity and event subscription list for this run (subscriptions never
    /// accumulate across executions).
    ///
    /// `wait = true` blocks until completion or timeout; `wait = false` spawns the execution
    /// and returns immediately with a handle. Equivalent to `execute_with_reset` with
    /// `reset_context = false` (preserve the lead's existing history, the common case for a
    /// plain swarm execution).
    pub async fn execute(&self, prompt: String, wait: bool) -> Result<Option<Message>, SwarmError> {
        self.execute_with_reset(prompt, wait, false).await
    }

    /// Same as `execute`, but `reset_context` controls whether the lead agent's conversation
    /// is cleared before this prompt is appended -- used by the workflow driver so a node's
    /// `reset_context` setting governs whether its mini-swarm starts fresh on each visit.
    pub async fn execute_with_reset(
        &self,
        prompt: String,
        wait: bool,
        reset_context: bool,
    ) -> Result<Option<Message>, SwarmError> {
        if wait {
            self.run_to_completion(prompt, reset_context).await.map(Some)
        } else {
            let handle = self.spawn(prompt, reset_context);
            drop(handle);
            Ok(None)
        }
    }

    /// Spawns the execution in the background and returns a handle the caller can `stop()`
    /// or `wait()` on.
    pub fn spawn(&self, prompt: String, reset_context: bool) -> ExecutionHandle {
        let swarm = self.swarm.clone();
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let join = tokio::spawn(async move {
            run_execution(swarm, prompt, reset_context, cancel_for_task).await
        });
        ExecutionHandle { cancel, join }
    }

    async fn run_to_completion(&self, prompt: String, reset_context: bool) -> Result<Message, SwarmError> {
        let cancel = CancellationToken::new();
        run_execution(self.swarm.clone(), prompt, reset_context, cancel).await
    }
}

async fn run_execution(
    swarm: Arc<Swarm>,
    prompt: String,
    reset_context: bool,
    cancel: CancellationToken,
) -> Result<Message, SwarmError> {
    // A swarm run from inside an already-active scope (a workflow node's mini-swarm) inherits
    // the parent's execution_id and event stream rather than starting a fresh execution, per
    // spec.md §4.1/§4.9/§8: nested mini-swarms share the top-level `execution_id`, with only
    // `swarm_id` becoming hierarchical (`parent/child`). The mini-swarm's own cancellation is
    // a child of the parent's, so an outer execution timeout reaches it too.
    let (identity, events, cancel) = if scheduler::in_scope() {
        let parent = scheduler::current_identity();
        let identity = Identity::new(parent.execution_id.clone(), parent.child_swarm_id(&swarm.id))
            .with_parent(parent.swarm_id.clone());
        (identity, scheduler::current_events(), scheduler::current_cancel().child_token())
    } else {
        let execution_id = scheduler::new_execution_id(&swarm.id);
        (Identity::new(execution_id, swarm.id.clone()), EventStream::new(), cancel)
    };
    let timeout = swarm.execution_timeout;

    let lead = swarm.lead.clone();
    let swarm_for_finally = swarm.clone();

    let outcome = scheduler::with_scope(identity, events.clone(), cancel.clone(), async move {
        scheduler::barrier_with_timeout(
            timeout,
            cancel.clone(),
            move || async move {
                scheduler::emit(EventKind::SwarmStart, None).await;
                lead.ask(prompt, PromptSource::User, reset_context).await
            },
            move || async move {
                let usage = aggregate_usage(&swarm_for_finally).await;
                scheduler::emit(
                    EventKind::SwarmStop {
                        total_cost: usage.total_cost,
                        total_tokens: usage.total_tokens,
                        per_agent_usage: serde_json::to_value(&usage.per_agent).unwrap_or(serde_json::Value::Null),
                    },
                    None,
                )
                .await;
            },
        )
        .await
    })
    .await;

    match outcome {
        BarrierOutcome::Completed(result) => result,
        BarrierOutcome::TimedOut => Err(SwarmError::ExecutionTimeout(timeout.as_secs())),
    }
}

/// Folds usage/cost across the lead agent, every registered primary agent, and every
/// delegate instance created during the execution, using the local pricing table (§4.10).
async fn aggregate_usage(swarm: &Swarm) -> ExecutionUsage {
    // Keyed by identity name to dedupe: a `SwarmBuilder`-built swarm's primary agents are the
    // same cached instances the `DelegationManager` hands back, so they'd otherwise be
    // double-counted alongside `all_instances()`.
    let mut instances: HashMap<String, Arc<AgentInstance>> = HashMap::new();
    instances.insert(swarm.lead.identity_name.clone(), swarm.lead.clone());
    for (name, instance) in &swarm.primary_agents {
        instances.entry(name.clone()).or_insert_with(|| instance.clone());
    }
    for (name, instance) in swarm.delegation.all_instances().await {
        instances.entry(name).or_insert(instance);
    }

    let table = crate::pricing::PricingTable::new();
    let mut rows = Vec::with_capacity(instances.len());
    for (name, instance) in &instances {
        rows.push((name.clone(), instance.definition.model.clone(), instance.usage().await));
    }
    let aggregate = crate::pricing::aggregate(&table, &rows);

    ExecutionUsage {
        total_tokens: aggregate.total_tokens,
        total_cost: aggregate.total_cost,
        per_agent: aggregate.per_agent_usage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentDefinition;
    use crate::hooks::HookRegistry;
    use crate::provider::{CompletionRequest, CompletionResponse, ProviderAdapter};
    use crate::tools::ToolRegistry;
    use async_trait::async_trait;

    struct EchoAdapter;

    #[async_trait]
    impl ProviderAdapter for EchoAdapter {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, crate::error::ProviderError> {
            Ok(CompletionResponse {
                message: Message::assistant(format!("handled {} messages", request.messages.len())),
                usage: Default::default(),
                finish_reason: Some("stop".into()),
                raw: serde_json::Value::Null,
            })
        }
    }

    fn make_lead() -> Arc<AgentInstance> {
        Arc::new(AgentInstance::new(
            "lead",
            AgentDefinition::new("lead", "test-model"),
            ToolRegistry::new(),
            Arc::new(HookRegistry::new()),
            Arc::new(EchoAdapter),
        ))
    }

    #[tokio::test]
    async fn execute_wait_true_returns_lead_response() {
        let swarm = Arc::new(Swarm::new("swarm_1", "test", make_lead()));
        let orchestrator = SwarmOrchestrator::new(swarm);
        let result = orchestrator.execute("hello".to_string(), true).await.unwrap();
        assert!(result.unwrap().content.as_text().contains("handled"));
    }

    #[tokio::test]
    async fn execute_wait_false_returns_none_immediately() {
        let swarm = Arc::new(Swarm::new("swarm_2", "test", make_lead()));
        let orchestrator = SwarmOrchestrator::new(swarm);
        let result = orchestrator.execute("hello".to_string(), false).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn handle_stop_cancels_before_completion() {
        let swarm = Arc::new(Swarm::new("swarm_3", "test", make_lead()).with_execution_timeout(Duration::from_secs(30)));
        let orchestrator = SwarmOrchestrator::new(swarm);
        let handle = orchestrator.spawn("hello".to_string(), false);
        handle.stop();
        let outcome = handle.wait().await;
        assert!(outcome.is_some());
    }

    #[tokio::test]
    async fn snapshot_round_trips_lead_conversation() {
        let lead = make_lead();
        lead.messages.lock().await.push(Message::user("earlier turn"));
        let swarm = Swarm::new("swarm_snap", "test", lead);

        let snapshot = swarm.to_snapshot(crate::snapshot::SnapshotSource::Manual, fixed_time()).await;
        assert_eq!(snapshot.agents.len(), 1);

        let fresh = Swarm::new("swarm_snap", "test", make_lead());
        fresh.restore_from_snapshot(&snapshot).await.unwrap();
        let restored = fresh.lead.messages.lock().await;
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].content.as_text(), "earlier turn");
    }

    #[tokio::test]
    async fn restore_from_snapshot_rejects_unknown_agent() {
        let swarm = Swarm::new("swarm_snap_2", "test", make_lead());
        let mut snapshot = swarm.to_snapshot(crate::snapshot::SnapshotSource::Manual, fixed_time()).await;
        snapshot.agents.insert(
            "ghost".to_string(),
            crate::snapshot::AgentSnapshot {
                identity_name: "ghost".into(),
                messages: vec![],
                compression_applied: false,
                threshold_hits: vec![],
            },
        );
        let err = swarm.restore_from_snapshot(&snapshot).await;
        assert!(err.is_err());
    }

    fn fixed_time() -> chrono::DateTime<chrono::Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }
}
