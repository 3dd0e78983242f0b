//! The notification sink interface and built-in recorders.

use std::sync::Mutex;

use tracing::{info, warn};

use crate::{EventSeverity, NodeEvent};

/// Sink for provisioning events.
///
/// Implementations must be fire-and-forget: `record` has no way to report
/// failure, and an implementation that talks to an external system is
/// expected to swallow and log its own delivery errors.
pub trait Recorder: Send + Sync {
    fn record(&self, event: NodeEvent);
}

/// Recorder that emits events as structured log lines.
#[derive(Debug, Default)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
    fn record(&self, event: NodeEvent) {
        match event.severity {
            EventSeverity::Normal => info!(
                node_id = %event.node_id,
                node_name = %event.node_name,
                event_type = %event.event_type,
                "{}",
                event.message
            ),
            EventSeverity::Warning => warn!(
                node_id = %event.node_id,
                node_name = %event.node_name,
                event_type = %event.event_type,
                "{}",
                event.message
            ),
        }
    }
}

/// Recorder that buffers events in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<NodeEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all recorded events in emission order.
    pub fn events(&self) -> Vec<NodeEvent> {
        self.events.lock().expect("recorder lock poisoned").clone()
    }

    /// Returns the event types recorded so far, in order.
    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }
}

impl Recorder for MemoryRecorder {
    fn record(&self, event: NodeEvent) {
        self.events.lock().expect("recorder lock poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_types;
    use vmprov_refs::NodeId;

    #[test]
    fn test_memory_recorder_keeps_order() {
        let recorder = MemoryRecorder::new();
        let id = NodeId::new();
        recorder.record(NodeEvent::normal(id, "n", event_types::NODE_CREATING, "a"));
        recorder.record(NodeEvent::normal(id, "n", event_types::NODE_CREATED, "b"));

        assert_eq!(
            recorder.event_types(),
            vec![event_types::NODE_CREATING, event_types::NODE_CREATED]
        );
    }
}
