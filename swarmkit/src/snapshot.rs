//! Execution snapshot format.
//!
//! A small versioned envelope (`version`, `created_at`, `source`) wraps an opaque payload so
//! the format can evolve without breaking old snapshots. Restoration is validated against the
//! *current* swarm topology, not the topology captured at snapshot time, since a topology can
//! legitimately change between when a snapshot was taken and when it's restored.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Message;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Where a snapshot came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    Manual,
    ExecutionTimeout,
    SwarmStop,
}

/// Saved state for one agent instance: its conversation plus the context-manager state
/// needed to resume compression/threshold behavior exactly where it left off.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub identity_name: String,
    pub messages: Vec<Message>,
    pub compression_applied: bool,
    pub threshold_hits: Vec<u8>,
}

/// Full execution snapshot: every agent instance plus swarm metadata, as an opaque versioned
/// envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub source: SnapshotSource,
    pub swarm_id: String,
    pub agents: HashMap<String, AgentSnapshot>,
}

impl Snapshot {
    pub fn new(swarm_id: impl Into<String>, source: SnapshotSource, created_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            created_at,
            source,
            swarm_id: swarm_id.into(),
            agents: HashMap::new(),
        }
    }

    pub fn with_agent(mut self, snapshot: AgentSnapshot) -> Self {
        self.agents.insert(snapshot.identity_name.clone(), snapshot);
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Validates that every agent named in `snapshot` still exists in the current topology
/// (`current_agent_names`); agents present in the topology but absent from the snapshot are
/// fine (they simply start fresh). An agent in the snapshot no longer present in the
/// topology is an error, since there is nowhere to restore it to.
pub fn validate_against_topology(snapshot: &Snapshot, current_agent_names: &[String]) -> Result<(), String> {
    for name in snapshot.agents.keys() {
        let base_name = name.split('@').next().unwrap_or(name);
        if !current_agent_names.iter().any(|n| n == base_name) {
            return Err(format!(
                "snapshot references agent '{name}' which no longer exists in the current swarm topology"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn roundtrips_through_bytes() {
        let snapshot = Snapshot::new("swarm_1", SnapshotSource::Manual, fixed_time()).with_agent(AgentSnapshot {
            identity_name: "lead".into(),
            messages: vec![Message::user("hi")],
            compression_applied: false,
            threshold_hits: vec![],
        });
        let bytes = snapshot.to_bytes().unwrap();
        let restored = Snapshot::from_bytes(&bytes).unwrap();
        assert_eq!(restored.version, SNAPSHOT_VERSION);
        assert_eq!(restored.agents.len(), 1);
    }

    #[test]
    fn validate_against_topology_rejects_removed_agent() {
        let snapshot = Snapshot::new("swarm_1", SnapshotSource::Manual, fixed_time()).with_agent(AgentSnapshot {
            identity_name: "researcher@lead".into(),
            messages: vec![],
            compression_applied: false,
            threshold_hits: vec![],
        });
        let err = validate_against_topology(&snapshot, &["lead".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn validate_against_topology_accepts_surviving_agent() {
        let snapshot = Snapshot::new("swarm_1", SnapshotSource::Manual, fixed_time()).with_agent(AgentSnapshot {
            identity_name: "researcher@lead".into(),
            messages: vec![],
            compression_applied: false,
            threshold_hits: vec![],
        });
        let result = validate_against_topology(&snapshot, &["lead".to_string(), "researcher".to_string()]);
        assert!(result.is_ok());
    }
}
