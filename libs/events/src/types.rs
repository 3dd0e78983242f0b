//! Provisioning event definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmprov_refs::NodeId;

/// All event type names as constants.
pub mod event_types {
    pub const NODE_CREATING: &str = "node.creating";
    pub const NODE_CREATED: &str = "node.created";
    pub const NODE_RECONFIGURED: &str = "node.reconfigured";
    pub const NODE_CREATE_FAILED: &str = "node.create_failed";
}

/// Event severity, mirroring the normal/warning split of the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    #[default]
    Normal,
    Warning,
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSeverity::Normal => write!(f, "normal"),
            EventSeverity::Warning => write!(f, "warning"),
        }
    }
}

/// A single provisioning event for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEvent {
    /// Identity of the node this event belongs to.
    pub node_id: NodeId,

    /// Display name of the node at emission time.
    pub node_name: String,

    /// One of the `event_types` constants.
    pub event_type: String,

    pub severity: EventSeverity,

    /// Human-readable description.
    pub message: String,

    pub occurred_at: DateTime<Utc>,
}

impl NodeEvent {
    /// Creates a normal-severity event.
    pub fn normal(
        node_id: NodeId,
        node_name: impl Into<String>,
        event_type: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node_id,
            node_name: node_name.into(),
            event_type: event_type.to_string(),
            severity: EventSeverity::Normal,
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Creates a warning-severity event.
    pub fn warning(
        node_id: NodeId,
        node_name: impl Into<String>,
        event_type: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: EventSeverity::Warning,
            ..Self::normal(node_id, node_name, event_type, message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_snake_case_severity() {
        let event = NodeEvent::warning(
            NodeId::new(),
            "worker-1",
            event_types::NODE_CREATE_FAILED,
            "creation failed",
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"severity\":\"warning\""));
        assert!(json.contains("node.create_failed"));
    }
}
