//! Identity envelope: execution_id, swarm_id, parent_swarm_id, timestamp, agent.
//!
//! Every `Event` carries these regardless of kind. `Identity` is the piece that is normally
//! supplied from scheduler-local storage rather than threaded explicitly through call sites
//! (see `swarmkit::scheduler` for the task-local propagation).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventKind;

/// Execution/swarm identity carried by every event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Identity {
    pub execution_id: String,
    pub swarm_id: String,
    pub parent_swarm_id: Option<String>,
}

impl Identity {
    pub fn new(execution_id: impl Into<String>, swarm_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            swarm_id: swarm_id.into(),
            parent_swarm_id: None,
        }
    }

    pub fn with_parent(mut self, parent_swarm_id: impl Into<String>) -> Self {
        self.parent_swarm_id = Some(parent_swarm_id.into());
        self
    }

    /// Builds a hierarchical id for a child swarm: `parent/child`.
    pub fn child_swarm_id(&self, child_name: &str) -> String {
        format!("{}/{}", self.swarm_id, child_name)
    }
}

/// A complete event: identity envelope + optional agent name + timestamp + payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    /// ISO-8601 with microsecond precision, so events within the same second stay orderable.
    pub timestamp: DateTime<Utc>,
    pub execution_id: String,
    pub swarm_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_swarm_id: Option<String>,
}

impl Event {
    /// Builds an event from a kind, filling envelope fields from `identity` and stamping the
    /// current time.
    pub fn new(kind: EventKind, identity: &Identity, agent: Option<String>) -> Self {
        Self {
            kind,
            agent,
            timestamp: Utc::now(),
            execution_id: identity.execution_id.clone(),
            swarm_id: identity.swarm_id.clone(),
            parent_swarm_id: identity.parent_swarm_id.clone(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn child_swarm_id_is_hierarchical() {
        let id = Identity::new("exec_1", "parent");
        assert_eq!(id.child_swarm_id("node:review"), "parent/node:review");
    }

    #[test]
    fn event_inherits_identity_fields() {
        let id = Identity::new("exec_1", "swarm_a").with_parent("swarm_root");
        let ev = Event::new(EventKind::SwarmStart, &id, Some("lead".into()));
        assert_eq!(ev.execution_id, "exec_1");
        assert_eq!(ev.swarm_id, "swarm_a");
        assert_eq!(ev.parent_swarm_id.as_deref(), Some("swarm_root"));
        assert_eq!(ev.agent.as_deref(), Some("lead"));
    }

    #[test]
    fn timestamp_has_microsecond_precision_available() {
        // chrono::DateTime<Utc> stores nanosecond precision; formatting to micros is
        // exercised by to_rfc3339_micros below (used by consumers that serialize for wire).
        let id = Identity::new("e", "s");
        let ev = Event::new(EventKind::AgentStart, &id, None);
        let formatted = ev.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Micros, true);
        assert!(formatted.contains('.'));
    }
}
