//! Tool registry and activation.
//!
//! A single `ToolRegistry` keeps every tool tagged with the source it came from (builtin,
//! delegation, MCP, plugin), since activation and permission rules need to reason about
//! source rather than just dispatching calls by name.

pub mod mcp;
pub mod permissions;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::SwarmError;

/// JSON-schema description of a tool, as sent to the provider.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Where a tool came from; drives activation and removability rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolSourceKind {
    Builtin,
    Delegation,
    Mcp,
    Plugin,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    /// Builtin identity tools (e.g. the delegation tools) are never user-removable.
    fn removable(&self) -> bool {
        true
    }
    async fn execute(&self, arguments: Value) -> Result<String, SwarmError>;
}

#[derive(Clone)]
struct Entry {
    tool: Arc<dyn Tool>,
    source: ToolSourceKind,
}

/// Holds every tool available to an agent instance, tagged by source. Cloning shares the
/// underlying `Arc<dyn Tool>` instances (cheap) rather than deep-copying tool state, so each
/// isolated delegate instance gets an independent registry seeded from the same tool set.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    entries: HashMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool` under `source`. A custom-tool name is inferred by the caller (by
    /// stripping the `Tool` suffix from the final path component) before calling this.
    pub fn register(&mut self, source: ToolSourceKind, tool: Arc<dyn Tool>) {
        let name = tool.spec().name;
        self.entries.insert(name, Entry { tool, source });
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.entries.get(name).map(|e| e.tool.clone())
    }

    pub fn source_of(&self, name: &str) -> Option<ToolSourceKind> {
        self.entries.get(name).map(|e| e.source)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self.entries.get(name) {
            Some(entry) if entry.tool.removable() => {
                self.entries.remove(name);
                true
            }
            _ => false,
        }
    }

    /// Active tool specs, applying `include` (an explicit allowlist, `None` means "all")
    /// and `exclude` (always wins over `include`) — the per-agent activation computation.
    pub fn active_specs(&self, include: Option<&[String]>, exclude: &[String]) -> Vec<ToolSpec> {
        self.entries
            .values()
            .filter(|e| match include {
                Some(names) => names.iter().any(|n| n == &e.tool.spec().name),
                None => true,
            })
            .filter(|e| !exclude.contains(&e.tool.spec().name))
            .map(|e| e.tool.spec())
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Strips a `Tool` suffix from the final `::`/`/`-separated path component and rejects
/// collisions with reserved (builtin/plugin) names.
pub fn infer_custom_tool_name(path: &str, reserved: &[String]) -> Result<String, SwarmError> {
    let last = path.rsplit(['/', ':']).next().unwrap_or(path);
    let stripped = last.strip_suffix("Tool").unwrap_or(last);
    if reserved.iter().any(|r| r == stripped) {
        return Err(SwarmError::Workflow(format!(
            "custom tool name '{stripped}' collides with a reserved tool name"
        )));
    }
    Ok(stripped.to_string())
}
