//! Status projection: narrow, copy-on-write updates to the node record.
//!
//! The free functions derive a fresh record from the caller's value; the
//! methods persist through the store. Callers never see in-place
//! mutation, so a retained reference elsewhere stays valid even when a
//! write later fails.

use chrono::Utc;
use vmprov_refs::{InstanceRef, TaskRef};

use crate::error::ProvisionError;
use crate::model::NodeRecord;
use crate::provision::Provisioner;

/// Returns a copy of `node` with its instance reference recorded.
pub fn with_instance_ref(node: &NodeRecord, vm: InstanceRef) -> NodeRecord {
    let mut updated = node.clone();
    updated.status.instance_ref = Some(vm);
    updated.status.last_updated = Some(Utc::now());
    updated
}

/// Returns a copy of `node` with its task reference replaced.
pub fn with_task_ref(node: &NodeRecord, task: Option<TaskRef>) -> NodeRecord {
    let mut updated = node.clone();
    updated.status.task_ref = task;
    updated.status.last_updated = Some(Utc::now());
    updated
}

impl Provisioner {
    /// Persists `vm` as the node's instance reference and returns the
    /// stored record.
    pub(crate) async fn set_instance_ref(
        &self,
        node: &NodeRecord,
        vm: InstanceRef,
    ) -> Result<NodeRecord, ProvisionError> {
        let updated = with_instance_ref(node, vm);
        Ok(self.store.update_node_status(&updated).await?)
    }

    /// Persists `task` as the node's task reference and returns the
    /// stored record. Skips the write when the stored value already
    /// matches, so repeated reconciles do not generate spurious update
    /// conflicts.
    pub(crate) async fn set_task_ref(
        &self,
        node: &NodeRecord,
        task: Option<TaskRef>,
    ) -> Result<NodeRecord, ProvisionError> {
        if node.status.task_ref == task {
            return Ok(node.clone());
        }
        let updated = with_task_ref(node, task);
        Ok(self.store.update_node_status(&updated).await?)
    }
}
