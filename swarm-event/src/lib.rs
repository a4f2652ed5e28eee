//! Event stream protocol for the swarm/workflow runtime.
//!
//! This crate defines the wire shape of a single event and the subscription/emission
//! primitives around it. It has no dependency on the agent/swarm engine crate (`swarmkit`);
//! `swarmkit` depends on this one, keeping the wire protocol usable by any consumer that
//! only needs to observe a run rather than drive one.

pub mod envelope;
pub mod event;
pub mod stream;

pub use envelope::{Event, Identity};
pub use event::{ChunkType, EventKind, McpInitMode, PromptSource, ToolResultMetadata};
pub use stream::{EventStream, FnSubscriber, Subscriber};
