//! Virtualization platform API surface.
//!
//! This module defines the wire types and the async [`Platform`] trait the
//! provisioner drives. Transport and session establishment live behind the
//! trait; every call is a single bounded network round trip and the
//! provisioner propagates cancellation rather than retrying internally.
//!
//! A [`MockPlatform`] with a scriptable inventory is provided for tests
//! and development.

mod mock;

pub use mock::{MockPlatform, TemplateFixture};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vmprov_refs::{InstanceRef, TaskRef};

/// Disk move mode requested for every clone: relocate all disk backings
/// and consolidate them at the target datastore.
pub const DISK_MOVE_ALL_CONSOLIDATE: &str = "moveAllDiskBackingsAndConsolidate";

/// Errors from the platform API.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// A named entity could not be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level or query failure; safe to retry unconditionally.
    #[error("query failed: {0}")]
    Query(String),

    /// The platform answered with something we cannot interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Reference to a managed entity that is neither a VM nor a task
/// (host, resource pool, datastore, folder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRef(String);

impl EntityRef {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A virtual disk present on a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskDevice {
    pub key: i32,
    pub label: String,
    pub capacity_bytes: i64,
}

/// A network adapter present on a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NicDevice {
    pub key: i32,
    pub label: String,
}

/// One guest-configurable OVF property declared by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvfProperty {
    pub key: i32,
    pub id: String,
    #[serde(default)]
    pub default_value: String,
}

/// Hardware and configuration snapshot of a VM or template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmProperties {
    pub vm: InstanceRef,
    pub name: String,
    pub disks: Vec<DiskDevice>,
    pub nics: Vec<NicDevice>,

    /// Declared OVF property set; `None` when the template has no vApp
    /// configuration at all.
    #[serde(default)]
    pub vapp_properties: Option<Vec<OvfProperty>>,
}

/// The host a VM currently lives on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProperties {
    pub host: EntityRef,
    pub name: String,
}

/// Resolved backing for one platform network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkBacking {
    pub name: String,
    pub reference: EntityRef,
}

/// Remote state of an asynchronous platform operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationState {
    Queued,
    Running,
    Success,
    Error,
    /// A state string this code does not know. Surfaced as a hard error
    /// by the task tracker; never silently dropped.
    Other(String),
}

/// What kind of operation a task reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Clone,
    Reconfigure,
    Other,
}

/// A point-in-time view of one asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationStatus {
    pub state: OperationState,
    pub kind: OperationKind,

    /// For a successful clone, the new VM's reference.
    pub result: Option<InstanceRef>,

    /// Display name of the entity the operation acted on, when known.
    pub entity_name: Option<String>,

    /// Platform-reported fault message for failed operations.
    pub message: Option<String>,
}

/// A `key=value` pair injected into the clone's extra configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraConfigPair {
    pub key: String,
    pub value: String,
}

/// Edit to one OVF property carried onto the clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OvfPropertyEdit {
    pub key: i32,
    pub id: String,
    pub value: String,
}

/// One entry in the clone's device-change list.
///
/// Removals and additions are expressed in a single list submitted
/// atomically with the clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeviceChange {
    /// Grow an existing disk in place.
    EditDisk {
        key: i32,
        label: String,
        capacity_bytes: i64,
    },

    /// Remove an adapter inherited from the template.
    RemoveNic { key: i32 },

    /// Attach a new adapter bound to a resolved network backing.
    AddNic { key: i32, backing: NetworkBacking },
}

/// Placement portion of a clone request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClonePlacement {
    pub datastore: EntityRef,
    pub pool: EntityRef,
    pub disk_move_type: String,
}

/// Configuration overrides applied to the clone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneConfig {
    /// Instance tag equal to the node's stable logical identity.
    pub instance_tag: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_cpus: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mib: Option<u64>,

    pub annotation: String,
    pub disk_uuid_enabled: bool,

    #[serde(default)]
    pub device_changes: Vec<DeviceChange>,

    #[serde(default)]
    pub extra_config: Vec<ExtraConfigPair>,

    #[serde(default)]
    pub vapp_property_edits: Vec<OvfPropertyEdit>,
}

/// A complete, fully resolved clone request. Ephemeral: built fresh on
/// every submission and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloneRequest {
    pub source: InstanceRef,
    pub name: String,
    pub folder: EntityRef,
    pub placement: ClonePlacement,
    pub config: CloneConfig,
    pub power_on: bool,
}

/// The virtualization platform API.
///
/// Implementations own transport and sessions. All methods are single
/// round trips bounded by the caller's cancellation.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Queries the global index for a VM-or-template carrying `tag` as
    /// its instance tag. `Ok(None)` means no match, not an error.
    async fn find_by_instance_tag(&self, tag: &str)
        -> Result<Option<InstanceRef>, PlatformError>;

    /// Resolves a VM or template by inventory name within a datacenter.
    async fn resolve_vm_by_name(
        &self,
        datacenter: &str,
        name: &str,
    ) -> Result<InstanceRef, PlatformError>;

    async fn vm_properties(&self, vm: &InstanceRef) -> Result<VmProperties, PlatformError>;

    /// The host a VM currently runs on.
    async fn host_of(&self, vm: &InstanceRef) -> Result<HostProperties, PlatformError>;

    /// The root resource pool of a host.
    async fn host_root_pool(&self, host: &EntityRef) -> Result<EntityRef, PlatformError>;

    /// Resolves a named resource pool; `Ok(None)` when it does not exist.
    async fn resolve_resource_pool(
        &self,
        datacenter: &str,
        name: &str,
    ) -> Result<Option<EntityRef>, PlatformError>;

    /// Creates a resource pool under `root` with platform default
    /// resource settings.
    async fn create_resource_pool(
        &self,
        root: &EntityRef,
        name: &str,
    ) -> Result<EntityRef, PlatformError>;

    /// Resolves a datastore; `None` picks the datacenter default.
    async fn resolve_datastore(
        &self,
        datacenter: &str,
        name: Option<&str>,
    ) -> Result<EntityRef, PlatformError>;

    /// Resolves a VM folder; `None` picks the datacenter default.
    async fn resolve_folder(
        &self,
        datacenter: &str,
        name: Option<&str>,
    ) -> Result<EntityRef, PlatformError>;

    async fn resolve_network(
        &self,
        datacenter: &str,
        name: &str,
    ) -> Result<NetworkBacking, PlatformError>;

    /// Looks up the state of an asynchronous operation. `Ok(None)` means
    /// the reference no longer resolves to any known operation.
    async fn operation_status(
        &self,
        task: &TaskRef,
    ) -> Result<Option<OperationStatus>, PlatformError>;

    /// Submits a clone and returns the reference of the queued operation.
    async fn submit_clone(&self, request: &CloneRequest) -> Result<TaskRef, PlatformError>;
}
