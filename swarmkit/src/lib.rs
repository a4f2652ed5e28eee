//! A runtime for multi-agent LLM workflows: agents that reason, call tools, and observe
//! results in a loop; swarms of agents that delegate work to one another; and workflows that
//! sequence swarms through a dependency graph.
//!
//! The three layers, outside-in:
//!
//! - [`workflow`] -- a DAG of named stages, each backed by a [`swarm::Swarm`], with
//!   transformers and goto/halt/skip control flow between stages.
//! - [`swarm`] -- one lead agent plus the primary agents and delegation topology reachable
//!   from it, executed under a single identity and timeout.
//! - [`agent`] -- a single agent's think -> call-tools -> observe loop ([`agent::AgentInstance::ask`]),
//!   with recovery from provider errors, progressive context compression, and orphaned
//!   tool-call pruning.
//!
//! Cross-cutting concerns live in their own modules: [`context`] (per-agent context window
//! management), [`hooks`] (lifecycle interception), [`tools`] (registry, permissions, MCP),
//! [`provider`] (the LLM adapter contract), [`delegation`] (agent-to-agent handoff),
//! [`scheduler`] (execution identity propagation and timeout barriers), [`pricing`] and
//! [`snapshot`] (usage accounting and state persistence).
//!
//! ```no_run
//! use std::sync::Arc;
//! use swarmkit::agent::{AgentDefinition, AgentInstance};
//! use swarmkit::hooks::HookRegistry;
//! use swarmkit::tools::ToolRegistry;
//!
//! # async fn run(provider: Arc<dyn swarmkit::provider::ProviderAdapter>) -> Result<(), swarmkit::error::SwarmError> {
//! let definition = AgentDefinition::new("assistant", "claude-sonnet");
//! definition.validate()?;
//! let agent = AgentInstance::new(
//!     "assistant",
//!     definition,
//!     ToolRegistry::new(),
//!     Arc::new(HookRegistry::new()),
//!     provider,
//! );
//! let reply = agent.ask("hello".into(), swarm_event::PromptSource::User, false).await?;
//! println!("{}", reply.content.as_text());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod context;
pub mod delegation;
pub mod error;
pub mod hooks;
pub mod message;
pub mod pricing;
pub mod provider;
pub mod scheduler;
pub mod snapshot;
pub mod swarm;
pub mod tools;
pub mod workflow;

pub use agent::{AgentDefinition, AgentInstance};
pub use error::{Result, SwarmError};
pub use message::{Content, Message, Role, ToolCall, Usage};
pub use swarm::{Swarm, SwarmOrchestrator};
pub use workflow::{Node as WorkflowNode, Workflow};

pub use swarm_event::{Event, EventKind, EventStream, Identity};

#[cfg(test)]
mod test_logging {
    use std::sync::Once;

    static INIT: Once = Once::new();

    /// Initializes `tracing` once for the whole test binary.
    pub fn init() {
        INIT.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        });
    }

    #[test]
    fn logging_initializes_without_panicking() {
        init();
        init();
    }
}
