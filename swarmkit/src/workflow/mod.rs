//! Workflow DAG driver.
//!
//! A workflow node resolves its successor the same way a conditional routing graph node
//! would, except each node here runs a mini-swarm rather than a single function.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SwarmError;
use crate::message::Message;
use crate::swarm::{Swarm, SwarmOrchestrator};

/// Where execution goes after a node finishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Next {
    Continue,
    Node(String),
    End,
}

/// A control-flow sentinel an input/output transformer can return in place of ordinary
/// content. `Skip` is only valid from an input transformer.
#[derive(Clone, Debug)]
pub enum ControlSignal {
    Goto { node: String, content: String },
    Halt { content: String },
    Skip { content: String },
}

/// What a transformer returns: either plain content to feed the node, or a control signal.
#[derive(Clone, Debug)]
pub enum TransformOutcome {
    Content(String),
    Control(ControlSignal),
}

/// Context handed to input/output transformers: the node's own content plus everything
/// upstream.
#[derive(Clone, Debug)]
pub struct TransformContext {
    pub content: String,
    pub original_prompt: String,
    pub all_results: HashMap<String, String>,
    pub node_name: String,
    pub dependencies: Vec<String>,
}

pub type Transformer = Arc<dyn Fn(&TransformContext) -> TransformOutcome + Send + Sync>;

/// One node in the workflow DAG: a named stage backed by a swarm, with dependencies and
/// optional transformers.
pub struct Node {
    pub name: String,
    pub swarm: Arc<Swarm>,
    pub depends_on: Vec<String>,
    pub input_transform: Option<Transformer>,
    pub output_transform: Option<Transformer>,
    /// If false, the node's agent-and-delegate state from the previous time this node ran
    /// (if any, in a goto loop) is preserved rather than reset.
    pub reset_context: bool,
}

impl Node {
    pub fn new(name: impl Into<String>, swarm: Arc<Swarm>) -> Self {
        Self {
            name: name.into(),
            swarm,
            depends_on: vec![],
            input_transform: None,
            output_transform: None,
            reset_context: true,
        }
    }

    pub fn depends_on(mut self, names: Vec<String>) -> Self {
        self.depends_on = names;
        self
    }
}

/// A DAG of nodes executed in dependency order, with goto/halt/skip control flow.
pub struct Workflow {
    pub name: String,
    pub nodes: HashMap<String, Node>,
    pub entry: String,
}

impl Workflow {
    pub fn new(name: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: HashMap::new(),
            entry: entry.into(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node.name.clone(), node);
        self
    }

    /// Runs the workflow starting at `entry`, following `Goto`/`Next::Node` transitions
    /// until `Next::End`, a `Halt`, or a missing node. Each visited node's output is
    /// recorded in `all_results` for downstream transformers.
    pub async fn run(&self, prompt: String) -> Result<String, SwarmError> {
        let mut all_results: HashMap<String, String> = HashMap::new();
        let mut current_name = self.entry.clone();
        let mut current_content = prompt.clone();
        let max_steps = self.nodes.len() * 4 + 8;

        for _ in 0..max_steps {
            let node = self
                .nodes
                .get(&current_name)
                .ok_or_else(|| SwarmError::Workflow(format!("workflow node '{current_name}' not found")))?;

            let transform_ctx = TransformContext {
                content: current_content.clone(),
                original_prompt: prompt.clone(),
                all_results: all_results.clone(),
                node_name: node.name.clone(),
                dependencies: node.depends_on.clone(),
            };

            let input = match &node.input_transform {
                Some(transform) => match transform(&transform_ctx) {
                    TransformOutcome::Content(content) => content,
                    TransformOutcome::Control(ControlSignal::Skip { content }) => {
                        all_results.insert(node.name.clone(), content.clone());
                        current_content = content;
                        current_name = self.next_node(&node.name);
                        continue;
                    }
                    TransformOutcome::Control(ControlSignal::Goto { node: target, content }) => {
                        all_results.insert(node.name.clone(), content.clone());
                        current_content = content;
                        current_name = target;
                        continue;
                    }
                    TransformOutcome::Control(ControlSignal::Halt { content }) => return Ok(content),
                },
                None => current_content.clone(),
            };

            let orchestrator = SwarmOrchestrator::new(node.swarm.clone());
            let result = orchestrator
                .execute_with_reset(input, true, node.reset_context)
                .await?
                .map(|m: Message| m.content.as_text())
                .unwrap_or_default();

            let output_ctx = TransformContext {
                content: result.clone(),
                ..transform_ctx
            };

            let (next_content, next_override) = match &node.output_transform {
                Some(transform) => match transform(&output_ctx) {
                    TransformOutcome::Content(content) => (content, None),
                    TransformOutcome::Control(ControlSignal::Goto { node: target, content }) => {
                        (content, Some(Next::Node(target)))
                    }
                    TransformOutcome::Control(ControlSignal::Halt { content }) => return Ok(content),
                    TransformOutcome::Control(ControlSignal::Skip { content: _ }) => {
                        return Err(SwarmError::Workflow(format!(
                            "Skip is only valid from an input transform (node '{}')",
                            node.name
                        )));
                    }
                },
                None => (result, None),
            };

            all_results.insert(node.name.clone(), next_content.clone());
            current_content = next_content;
            current_name = match next_override {
                Some(Next::Node(target)) => target,
                _ => self.next_node(&node.name),
            };
            if current_name == "__end__" {
                return Ok(current_content);
            }
        }

        Err(SwarmError::Workflow(format!(
            "workflow '{}' exceeded max step budget ({max_steps}), likely an unterminated goto loop",
            self.name
        )))
    }

    /// Default successor: the first node whose `depends_on` includes this node's name, or
    /// `__end__` if none depend on it (simple linear/fan-in DAG resolution; explicit control
    /// signals override this via `ControlSignal::Goto`).
    fn next_node(&self, name: &str) -> String {
        self.nodes
            .values()
            .find(|n| n.depends_on.iter().any(|d| d == name))
            .map(|n| n.name.clone())
            .unwrap_or_else(|| "__end__".to_string())
    }
}

/// Builds the `swarm_id` for a workflow node's mini-swarm execution: `<workflow>/node:<name>`.
pub fn node_swarm_id(workflow_name: &str, node_name: &str) -> String {
    format!("{workflow_name}/node:{node_name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_swarm_id_is_hierarchical() {
        assert_eq!(node_swarm_id("pipeline", "review"), "pipeline/node:review");
    }

    #[test]
    fn next_node_resolves_linear_dependency() {
        let swarm_a = Arc::new(Swarm::new("a", "a", dummy_lead()));
        let swarm_b = Arc::new(Swarm::new("b", "b", dummy_lead()));
        let workflow = Workflow::new("pipeline", "a")
            .with_node(Node::new("a", swarm_a))
            .with_node(Node::new("b", swarm_b).depends_on(vec!["a".to_string()]));
        assert_eq!(workflow.next_node("a"), "b");
        assert_eq!(workflow.next_node("b"), "__end__");
    }

    fn dummy_lead() -> Arc<crate::agent::AgentInstance> {
        use crate::agent::AgentDefinition;
        use crate::hooks::HookRegistry;
        use crate::provider::{CompletionRequest, CompletionResponse, ProviderAdapter};
        use crate::tools::ToolRegistry;
        use async_trait::async_trait;

        struct NoopAdapter;
        #[async_trait]
        impl ProviderAdapter for NoopAdapter {
            async fn complete(
                &self,
                _request: CompletionRequest,
            ) -> Result<CompletionResponse, crate::error::ProviderError> {
                Ok(CompletionResponse {
                    message: Message::assistant("ok"),
                    usage: Default::default(),
                    finish_reason: Some("stop".into()),
                    raw: serde_json::Value::Null,
                })
            }
        }

        Arc::new(crate::agent::AgentInstance::new(
            "lead",
            AgentDefinition::new("lead", "test-model"),
            ToolRegistry::new(),
            Arc::new(HookRegistry::new()),
            Arc::new(NoopAdapter),
        ))
    }
}
