//! Delegation: one agent handing a sub-task to another.
//!
//! One agent invoking another as a tool, generalized to an isolated/shared instance
//! lifecycle and nested naming (`c@b@a`) so a delegation chain can run arbitrarily deep
//! without instance name collisions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use swarm_event::{EventKind, PromptSource};
use tokio::sync::{Mutex, RwLock};

use crate::agent::{AgentDefinition, AgentInstance};
use crate::error::{ConfigError, SwarmError};
use crate::hooks::HookRegistry;
use crate::provider::ProviderAdapter;
use crate::scheduler;
use crate::tools::{Tool, ToolRegistry, ToolSpec};

/// Builds the qualified instance name for a delegate: `target@delegator`, nesting for
/// deeper chains (`c@b@a`).
pub fn qualified_name(target: &str, delegator_identity: &str) -> String {
    format!("{target}@{delegator_identity}")
}

/// Detects a delegation cycle by walking the `target@...` chain already present in
/// `delegator_identity` and checking whether `target` already appears in it.
pub fn detect_cycle(target: &str, delegator_identity: &str) -> Result<(), ConfigError> {
    if delegator_identity.split('@').any(|segment| segment == target) {
        return Err(ConfigError::DelegationCycle(format!(
            "{target} already present in delegation chain '{delegator_identity}'"
        )));
    }
    Ok(())
}

/// Builds a fresh instance for the given qualified identity (e.g. `tester@frontend`). The
/// identity is not known until the first delegator calls in, so it must be a parameter
/// rather than baked into the factory at registration time.
type InstanceFactory = dyn Fn(&str) -> Arc<AgentInstance> + Send + Sync;

/// Lazily creates and caches delegate instances, keyed by qualified name. Isolated mode
/// creates one instance per distinct delegator; shared mode reuses one instance across every
/// delegator for the same base agent name.
pub struct DelegationManager {
    instances: Mutex<HashMap<String, Arc<AgentInstance>>>,
    /// Behind a lock (rather than requiring `&mut self`) so a swarm builder can register every
    /// agent's factory against a shared `Arc<DelegationManager>` that those same factories
    /// also capture, for nested delegation -- without a two-phase mutable/shared split.
    factories: RwLock<HashMap<String, Arc<InstanceFactory>>>,
    /// Snapshot state staged for a delegate instance that doesn't exist yet, keyed by
    /// qualified name. Applied the moment `get_or_create` actually builds that instance, so a
    /// restore can target an isolated delegate that is still lazy.
    pending_snapshots: Mutex<HashMap<String, crate::snapshot::AgentSnapshot>>,
}

impl DelegationManager {
    pub fn new() -> Self {
        Self {
            instances: Mutex::new(HashMap::new()),
            factories: RwLock::new(HashMap::new()),
            pending_snapshots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn register_factory(&self, target_agent: &str, factory: Arc<InstanceFactory>) {
        self.factories.write().await.insert(target_agent.to_string(), factory);
    }

    /// Stages a snapshot for `key` (a qualified or base instance name) to be applied the next
    /// time that instance is created, for an isolated delegate that hasn't been lazily
    /// instantiated yet at restore time.
    pub async fn stage_snapshot(&self, key: String, snapshot: crate::snapshot::AgentSnapshot) {
        self.pending_snapshots.lock().await.insert(key, snapshot);
    }

    /// Returns the cached instance for `key`, creating it on first use. Concurrent first
    /// calls are serialized by the outer mutex so only one instance is ever constructed.
    async fn get_or_create(&self, target_agent: &str, key: String) -> Result<Arc<AgentInstance>, SwarmError> {
        let mut instances = self.instances.lock().await;
        if let Some(existing) = instances.get(&key) {
            return Ok(existing.clone());
        }
        scheduler::emit(
            EventKind::AgentLazyInitializationStart {
                instance_name: key.clone(),
            },
            None,
        )
        .await;
        let factory = {
            let factories = self.factories.read().await;
            factories
                .get(target_agent)
                .cloned()
                .ok_or_else(|| SwarmError::Workflow(format!("no agent definition registered for '{target_agent}'")))?
        };
        let instance = factory(&key);
        if let Some(snapshot) = self.pending_snapshots.lock().await.remove(&key) {
            instance.restore_snapshot(&snapshot).await;
        }
        instances.insert(key.clone(), instance.clone());
        scheduler::emit(
            EventKind::AgentLazyInitializationComplete {
                instance_name: key,
            },
            None,
        )
        .await;
        Ok(instance)
    }

    /// Resolves the instance a delegation call should run against, given the binding's mode
    /// and the delegator's own qualified identity.
    pub async fn resolve(
        &self,
        target_agent: &str,
        delegator_identity: &str,
        shared: bool,
    ) -> Result<Arc<AgentInstance>, SwarmError> {
        detect_cycle(target_agent, delegator_identity).map_err(SwarmError::from)?;
        let key = if shared {
            target_agent.to_string()
        } else {
            qualified_name(target_agent, delegator_identity)
        };
        self.get_or_create(target_agent, key).await
    }

    /// Eagerly creates the shared instance for `target_agent` if it doesn't exist yet. Used
    /// at swarm-construction time for bindings with `shared_across_delegations = true`, which
    /// are built up front rather than lazily on first call (§3 Lifecycle).
    pub async fn ensure_shared(&self, target_agent: &str) -> Result<Arc<AgentInstance>, SwarmError> {
        self.get_or_create(target_agent, target_agent.to_string()).await
    }

    /// Every delegate instance created so far, keyed by qualified name -- used at
    /// `swarm_stop` to fold delegate usage into the execution-wide aggregate.
    pub async fn all_instances(&self) -> Vec<(String, Arc<AgentInstance>)> {
        self.instances
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for DelegationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Tool surface exposed to a delegator for one delegation binding: `WorkWith<Target>` by
/// default, or `tool_name_override` when the binding names an explicit tool name.
pub struct DelegationTool {
    pub target_agent: String,
    pub delegator_identity: String,
    pub preserve_context: bool,
    pub shared: bool,
    pub manager: Arc<DelegationManager>,
    pub tool_name_override: Option<String>,
}

impl DelegationTool {
    pub fn tool_name(target_agent: &str) -> String {
        format!("WorkWith{target_agent}")
    }
}

#[async_trait]
impl Tool for DelegationTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self
                .tool_name_override
                .clone()
                .unwrap_or_else(|| Self::tool_name(&self.target_agent)),
            description: format!("Delegate a task to the '{}' agent.", self.target_agent),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string"},
                    "reset_context": {"type": "boolean"}
                },
                "required": ["message"]
            }),
        }
    }

    fn removable(&self) -> bool {
        false
    }

    async fn execute(&self, arguments: Value) -> Result<String, SwarmError> {
        let message = arguments
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SwarmError::MissingParameter(self.spec().name, "message".to_string()))?
            .to_string();

        // Per-call override wins over the binding's static default (Open Question (a)).
        let reset_context = arguments
            .get("reset_context")
            .and_then(|v| v.as_bool())
            .unwrap_or(!self.preserve_context);

        let instance = self
            .manager
            .resolve(&self.target_agent, &self.delegator_identity, self.shared)
            .await?;

        let response = instance
            .ask(message, PromptSource::Delegation, reset_context)
            .await?;

        let content = response.content.as_text();
        scheduler::emit(
            EventKind::DelegationResult {
                target: self.target_agent.clone(),
                content: content.clone(),
            },
            Some(self.delegator_identity.clone()),
        )
        .await;
        Ok(content)
    }
}

/// Builds an `AgentInstance` factory closure for a delegate definition, sharing the same
/// provider/hooks/tool-registry construction path as a primary agent. For an isolated
/// binding this factory is invoked once per distinct delegator (each call gets the qualified
/// identity the manager computed, e.g. `tester@frontend`) and each gets its own clone of the
/// seed tool registry; for a shared binding it is invoked once total.
pub fn instance_factory(
    identity_name: String,
    definition: AgentDefinition,
    tools: ToolRegistry,
    hooks: Arc<HookRegistry>,
    provider: Arc<dyn ProviderAdapter>,
) -> Arc<InstanceFactory> {
    let _ = &identity_name; // retained for API symmetry with primary-agent construction sites
    Arc::new(move |qualified_identity: &str| {
        Arc::new(AgentInstance::new(
            qualified_identity.to_string(),
            definition.clone(),
            tools.clone(),
            hooks.clone(),
            provider.clone(),
        ))
    }) as Arc<InstanceFactory>
}
