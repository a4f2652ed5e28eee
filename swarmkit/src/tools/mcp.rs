//! Lazy MCP tool-schema loading.
//!
//! A full MCP client is out of scope here; this module models the lifecycle the engine
//! needs around one: in `Optimized` mode (an explicit tool list was configured) no
//! `tools/list` RPC is issued at startup -- stub schemas are created immediately and the
//! real schema for each tool is loaded on its first call. In `Discovery` mode the full
//! `tools/list` RPC runs up front. Both modes bracket server initialization with
//! `mcp_server_init_start`/`mcp_server_init_complete` so the event log can reconstruct when
//! a server came online and how many tools it ended up exposing.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::Value;
use swarm_event::{EventKind, McpInitMode};

use crate::error::SwarmError;
use crate::scheduler;
use crate::tools::{Tool, ToolSpec};

/// The actual JSON-RPC transport is injected by the caller (out of scope here); this trait
/// only models the two RPCs the engine needs: listing every tool up front, and fetching one
/// tool's real schema by name (used to resolve a stub on first use in `Optimized` mode).
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn list_tools(&self, server: &str) -> Result<Vec<ToolSpec>, SwarmError>;
    async fn fetch_schema(&self, server: &str, tool: &str) -> Result<ToolSpec, SwarmError>;
    async fn call_tool(&self, server: &str, tool: &str, arguments: Value) -> Result<String, SwarmError>;
}

/// A minimal, permissive schema handed to the provider before a stub's real schema has been
/// fetched. Present so `ToolRegistry::active_specs` has something to advertise immediately.
fn stub_spec(name: &str) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: String::new(),
        input_schema: serde_json::json!({"type": "object"}),
    }
}

/// A handle to one MCP-backed tool: either a real schema fetched already (`Discovery` mode,
/// or a stub that has since resolved), or a stub schema pending its first call. `spec()` is
/// a synchronous trait method, so the current best-known schema is cached behind a plain
/// `Mutex` rather than re-fetched on every read.
pub struct McpTool {
    pub server: String,
    name: String,
    spec: StdMutex<ToolSpec>,
    resolved: std::sync::atomic::AtomicBool,
    transport: Arc<dyn McpTransport>,
}

impl McpTool {
    /// A tool whose real schema is already known (built from a `Discovery`-mode `list_tools`
    /// response).
    pub fn loaded(server: impl Into<String>, spec: ToolSpec, transport: Arc<dyn McpTransport>) -> Self {
        Self {
            server: server.into(),
            name: spec.name.clone(),
            spec: StdMutex::new(spec),
            resolved: std::sync::atomic::AtomicBool::new(true),
            transport,
        }
    }

    /// A tool known only by name (`Optimized` mode): its schema is the generic stub until
    /// `execute` resolves it on first call.
    pub fn stub(server: impl Into<String>, name: impl Into<String>, transport: Arc<dyn McpTransport>) -> Self {
        let name = name.into();
        Self {
            server: server.into(),
            spec: StdMutex::new(stub_spec(&name)),
            name,
            resolved: std::sync::atomic::AtomicBool::new(false),
            transport,
        }
    }

    fn is_resolved(&self) -> bool {
        self.resolved.load(std::sync::atomic::Ordering::Acquire)
    }

    async fn resolve_schema(&self) -> Result<(), SwarmError> {
        if self.is_resolved() {
            return Ok(());
        }
        let fetched = self.transport.fetch_schema(&self.server, &self.name).await?;
        *self.spec.lock().expect("mcp tool spec mutex poisoned") = fetched;
        self.resolved.store(true, std::sync::atomic::Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl Tool for McpTool {
    fn spec(&self) -> ToolSpec {
        self.spec.lock().expect("mcp tool spec mutex poisoned").clone()
    }

    async fn execute(&self, arguments: Value) -> Result<String, SwarmError> {
        self.resolve_schema().await?;
        self.transport.call_tool(&self.server, &self.name, arguments).await
    }
}

/// Brackets server initialization with `mcp_server_init_start`/`complete` and returns every
/// tool the server exposes, eagerly resolved (`Discovery`) or as lazy stubs
/// (`Optimized`, given the server's configured explicit tool list).
pub async fn init_server(
    server: &str,
    mode: McpInitMode,
    explicit_tool_names: &[String],
    transport: Arc<dyn McpTransport>,
) -> Result<Vec<Arc<McpTool>>, SwarmError> {
    scheduler::emit(
        EventKind::McpServerInitStart {
            server: server.to_string(),
            mode,
        },
        None,
    )
    .await;

    let tools = match mode {
        McpInitMode::Discovery => {
            let specs = transport.list_tools(server).await?;
            specs
                .into_iter()
                .map(|spec| Arc::new(McpTool::loaded(server, spec, transport.clone())))
                .collect::<Vec<_>>()
        }
        McpInitMode::Optimized => explicit_tool_names
            .iter()
            .map(|name| Arc::new(McpTool::stub(server, name.clone(), transport.clone())))
            .collect::<Vec<_>>(),
    };

    scheduler::emit(
        EventKind::McpServerInitComplete {
            server: server.to_string(),
            mode,
            tool_count: tools.len(),
        },
        None,
    )
    .await;

    Ok(tools)
}
