//! Task tracking: drives the state machine over the one outstanding
//! asynchronous platform operation.
//!
//! Invoked once per reconcile when a task reference is stored. Terminal
//! outcomes clear the reference; a queued or running operation produces a
//! retry-after signal and no other mutation.

use tracing::{debug, info, warn};
use vmprov_events::{event_types, NodeEvent};
use vmprov_refs::TaskRef;

use crate::error::{ProvisionError, Reconciliation};
use crate::model::NodeRecord;
use crate::platform::{OperationKind, OperationState, OperationStatus, PlatformError};
use crate::provision::Provisioner;

impl Provisioner {
    /// Checks the tracked operation and advances the node accordingly.
    pub(crate) async fn track_task(
        &self,
        node: &NodeRecord,
        task: &TaskRef,
    ) -> Result<Reconciliation, ProvisionError> {
        let Some(status) = self.platform.operation_status(task).await? else {
            // The platform no longer knows this operation; there is
            // nothing left to track.
            info!(node_id = %node.id, task = %task, "Tracked operation no longer exists, clearing reference");
            self.set_task_ref(node, None).await?;
            return Ok(Reconciliation::Done);
        };

        match status.state {
            OperationState::Queued | OperationState::Running => {
                debug!(node_id = %node.id, task = %task, "Operation still in progress");
                Ok(Reconciliation::RetryAfter(self.config.task_poll_interval))
            }
            OperationState::Success => self.task_succeeded(node, task, &status).await,
            OperationState::Error => self.task_failed(node, task, &status).await,
            OperationState::Other(state) => {
                // Leaving the reference in place keeps the operation
                // visible for investigation instead of dropping tracking.
                warn!(node_id = %node.id, task = %task, state = %state, "Unknown state for tracked operation");
                Err(ProvisionError::UnknownTaskState {
                    task: task.clone(),
                    state,
                })
            }
        }
    }

    async fn task_succeeded(
        &self,
        node: &NodeRecord,
        task: &TaskRef,
        status: &OperationStatus,
    ) -> Result<Reconciliation, ProvisionError> {
        match status.kind {
            OperationKind::Clone => {
                let vm = status.result.clone().ok_or_else(|| {
                    PlatformError::InvalidResponse(
                        "clone completed without a result reference".to_string(),
                    )
                })?;
                info!(node_id = %node.id, task = %task, vm = %vm, "Clone completed");
                self.record(NodeEvent::normal(
                    node.id,
                    &node.name,
                    event_types::NODE_CREATED,
                    format!("Created node {} ({})", node.name, vm),
                ));
                let node = self.set_instance_ref(node, vm).await?;
                self.set_task_ref(&node, None).await?;
            }
            OperationKind::Reconfigure => {
                let entity = status.entity_name.as_deref().unwrap_or(&node.name);
                info!(node_id = %node.id, task = %task, "Reconfigure completed");
                self.record(NodeEvent::normal(
                    node.id,
                    &node.name,
                    event_types::NODE_RECONFIGURED,
                    format!("Reconfigured node {entity}"),
                ));
                self.set_task_ref(node, None).await?;
            }
            OperationKind::Other => {
                self.set_task_ref(node, None).await?;
            }
        }
        Ok(Reconciliation::Done)
    }

    async fn task_failed(
        &self,
        node: &NodeRecord,
        task: &TaskRef,
        status: &OperationStatus,
    ) -> Result<Reconciliation, ProvisionError> {
        match status.kind {
            OperationKind::Clone => {
                let detail = status.message.as_deref().unwrap_or("unknown fault");
                warn!(node_id = %node.id, task = %task, detail = %detail, "Clone failed");
                self.record(NodeEvent::warning(
                    node.id,
                    &node.name,
                    event_types::NODE_CREATE_FAILED,
                    format!("Creation failed for node {}: {detail}", node.name),
                ));
                // Clearing the reference is what lets the next reconcile
                // submit a fresh clone.
                self.set_task_ref(node, None).await?;
            }
            OperationKind::Reconfigure | OperationKind::Other => {
                // Policy decision, recorded in DESIGN.md: these operations
                // are never re-submitted by this reconciler, so the
                // reference is cleared rather than left to wedge the node.
                warn!(node_id = %node.id, task = %task, "Non-clone operation failed, clearing reference");
                self.set_task_ref(node, None).await?;
            }
        }
        Ok(Reconciliation::Done)
    }
}
