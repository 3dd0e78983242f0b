//! The provisioning reconciler core.
//!
//! `Provisioner::reconcile` is the entry point. Each invocation performs
//! at most one action, in this order:
//!
//! 1. A stored task reference delegates entirely to the task tracker.
//! 2. Otherwise the platform is asked for a VM already carrying the
//!    node's instance tag; a match is recorded immediately. This covers
//!    a prior run that submitted a clone and then died before
//!    persisting the reference.
//! 3. Otherwise a fresh clone is built and submitted, and its task
//!    reference persisted for the next invocation.
//!
//! All progress state lives in the node's status record; the provisioner
//! holds no per-node memory between invocations.

mod clone;
mod status;
mod task;

pub use status::{with_instance_ref, with_task_ref};

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use vmprov_events::{event_types, NodeEvent, Recorder};

use crate::bootstrap::PayloadSource;
use crate::error::{ProvisionError, Reconciliation};
use crate::model::{ClusterRecord, NodeRecord};
use crate::platform::Platform;
use crate::store::RecordStore;

/// Tunables for the provisioner.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Delay returned to the scheduler while a tracked operation is
    /// still queued or running.
    pub task_poll_interval: Duration,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            task_poll_interval: Duration::from_secs(5),
        }
    }
}

/// The provisioning reconciler.
pub struct Provisioner {
    platform: Arc<dyn Platform>,
    store: Arc<dyn RecordStore>,
    payloads: Arc<dyn PayloadSource>,
    recorder: Arc<dyn Recorder>,
    config: ProvisionerConfig,
}

impl Provisioner {
    pub fn new(
        platform: Arc<dyn Platform>,
        store: Arc<dyn RecordStore>,
        payloads: Arc<dyn PayloadSource>,
        recorder: Arc<dyn Recorder>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            platform,
            store,
            payloads,
            recorder,
            config,
        }
    }

    /// Runs one reconcile invocation for `node`.
    ///
    /// Safe to re-enter after a partial failure: every step reads the
    /// durable record and the platform before acting.
    pub async fn reconcile(
        &self,
        cluster: &ClusterRecord,
        node: &NodeRecord,
    ) -> Result<Reconciliation, ProvisionError> {
        debug!(node_id = %node.id, node_name = %node.name, "Reconciling node");

        if let Some(task) = node.status.task_ref.clone() {
            return self.track_task(node, &task).await;
        }

        // A clone may have been submitted by a run that died before it
        // could persist the task reference; the instance tag stamped into
        // the clone config is how such a VM is found again. A match ends
        // the invocation: at most one VM may exist under this identity
        // (see DESIGN.md, Open Questions).
        if let Some(vm) = self
            .platform
            .find_by_instance_tag(&node.instance_tag())
            .await?
        {
            if node.status.instance_ref.as_ref() != Some(&vm) {
                info!(node_id = %node.id, vm = %vm, "Found existing VM by instance tag");
                self.record(NodeEvent::normal(
                    node.id,
                    &node.name,
                    event_types::NODE_CREATED,
                    format!("Created node {} ({})", node.name, vm),
                ));
                self.set_instance_ref(node, vm).await?;
            }
            return Ok(Reconciliation::Done);
        }

        self.clone_node(cluster, node).await
    }

    /// Fire-and-forget event emission.
    fn record(&self, event: NodeEvent) {
        self.recorder.record(event);
    }
}
