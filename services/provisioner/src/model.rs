//! Declarative node and cluster records.
//!
//! A node record is the unit of reconciliation: a desired configuration
//! plus a mutable status block. The record is owned by the external store;
//! the provisioner receives it per call and writes status back through
//! copy-on-write updates, never assuming a write commits atomically with
//! its own logic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vmprov_refs::{ClusterId, InstanceRef, NodeId, TaskRef};

/// A declarative node record: desired spec plus mutable status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: NodeId,

    /// Display name; becomes the cloned VM's name.
    pub name: String,

    /// Store-managed revision, used for optimistic concurrency.
    #[serde(default)]
    pub generation: u64,

    pub spec: NodeSpec,

    #[serde(default)]
    pub status: NodeStatus,
}

impl NodeRecord {
    /// Creates a fresh record with empty status.
    pub fn new(name: impl Into<String>, spec: NodeSpec) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            generation: 0,
            spec,
            status: NodeStatus::default(),
        }
    }

    /// The platform instance tag for this node.
    ///
    /// Stamped onto the VM at clone time so later reconciles can re-find
    /// it without any other state.
    pub fn instance_tag(&self) -> String {
        self.id.to_string()
    }
}

/// Desired configuration for a node's VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Source template, as a friendly name or a platform-native UUID.
    pub template: String,

    pub datacenter: String,

    /// Target VM folder; `None` uses the platform default.
    #[serde(default)]
    pub vm_folder: Option<String>,

    /// Target datastore; `None` uses the platform default.
    #[serde(default)]
    pub datastore: Option<String>,

    /// Resource pool name. `None` deploys directly under the resolved
    /// host's root pool.
    #[serde(default)]
    pub resource_pool: Option<String>,

    /// CPU count override; 0 inherits the template value.
    #[serde(default)]
    pub num_cpus: u32,

    /// Memory override in MiB; 0 inherits the template value.
    #[serde(default)]
    pub memory_mib: u64,

    /// Disk resize directives, matched against template disks by label.
    #[serde(default)]
    pub disks: Vec<DiskResize>,

    /// Networks to attach, replacing every adapter on the template.
    #[serde(default)]
    pub networks: Vec<NetworkAttachment>,

    #[serde(default)]
    pub customization: CustomizationMode,

    #[serde(default)]
    pub trusted_certs: Vec<String>,

    #[serde(default)]
    pub ntp_servers: Vec<String>,

    #[serde(default)]
    pub role: NodeRole,

    #[serde(default)]
    pub versions: ComponentVersions,

    /// Whether the template image is preloaded with node components.
    #[serde(default)]
    pub preloaded: bool,
}

/// A label-to-target-size resize directive.
///
/// Matched disks are grown to the target; shrinking is rejected before
/// submission. Partial matches are allowed, but a non-empty directive set
/// that matches nothing is a configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskResize {
    pub label: String,
    pub size_gib: u64,
}

/// One network to attach to the cloned VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAttachment {
    pub name: String,
}

/// How bootstrap payloads reach the guest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CustomizationMode {
    /// Platform-native guest-configuration metadata keys.
    #[default]
    GuestInfoMetadata,

    /// Legacy OVF property carry-over; requires the template to declare a
    /// guest-configurable property set.
    OvfProperties,
}

/// Role of the node within its cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    ControlPlane,
    #[default]
    Worker,
}

impl NodeRole {
    pub fn is_control_plane(&self) -> bool {
        matches!(self, NodeRole::ControlPlane)
    }
}

/// Component versions the bootstrap payloads are templated from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ComponentVersions {
    #[serde(default)]
    pub control_plane: Option<String>,

    #[serde(default)]
    pub kubelet: Option<String>,
}

/// Mutable provisioning status, persisted by the external store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeStatus {
    /// The VM this node resolved to, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_ref: Option<InstanceRef>,

    /// The one outstanding asynchronous platform operation, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_ref: Option<TaskRef>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

/// Read-only cluster context for payload parameterization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterRecord {
    pub id: ClusterId,
    pub name: String,
    pub spec: ClusterSpec,
}

impl ClusterRecord {
    pub fn new(name: impl Into<String>, spec: ClusterSpec) -> Self {
        Self {
            id: ClusterId::new(),
            name: name.into(),
            spec,
        }
    }
}

/// Cluster-level connection and bootstrap parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSpec {
    /// Platform server address, with or without a URL scheme.
    pub server: String,

    pub username: String,
    pub password: String,

    #[serde(default)]
    pub insecure: bool,

    /// Default network for workloads that do not name one.
    #[serde(default)]
    pub default_network: Option<String>,

    /// Readiness of the cluster's API endpoint; worker bootstrap waits
    /// for `Ready`.
    #[serde(default)]
    pub api_status: ApiStatus,
}

/// Cluster API endpoint readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiStatus {
    #[default]
    Pending,
    Ready,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_spec() -> NodeSpec {
        NodeSpec {
            template: "base-template".to_string(),
            datacenter: "dc0".to_string(),
            vm_folder: None,
            datastore: None,
            resource_pool: None,
            num_cpus: 0,
            memory_mib: 0,
            disks: vec![],
            networks: vec![],
            customization: CustomizationMode::default(),
            trusted_certs: vec![],
            ntp_servers: vec![],
            role: NodeRole::default(),
            versions: ComponentVersions::default(),
            preloaded: false,
        }
    }

    #[test]
    fn test_instance_tag_is_node_id() {
        let node = NodeRecord::new("worker-0", minimal_spec());
        assert_eq!(node.instance_tag(), node.id.to_string());
    }

    #[test]
    fn test_spec_defaults_from_minimal_json() {
        let json = r#"{
            "template": "ubuntu-2204",
            "datacenter": "dc0"
        }"#;
        let spec: NodeSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.num_cpus, 0);
        assert_eq!(spec.memory_mib, 0);
        assert!(spec.resource_pool.is_none());
        assert_eq!(spec.customization, CustomizationMode::GuestInfoMetadata);
        assert_eq!(spec.role, NodeRole::Worker);
    }

    #[test]
    fn test_status_roundtrip_skips_empty_fields() {
        let status = NodeStatus::default();
        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "{}");
    }
}
