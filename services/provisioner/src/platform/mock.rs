//! Mock platform implementation for testing and development.
//!
//! Holds a scriptable inventory (templates, networks, datastores, pools)
//! and a task table the tests drive forward by hand. Submitted clone
//! requests are recorded verbatim so tests can assert on the exact
//! specification that would have gone over the wire.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;
use vmprov_refs::{InstanceRef, TaskRef};

use super::{
    CloneRequest, DiskDevice, EntityRef, HostProperties, NetworkBacking, NicDevice,
    OperationKind, OperationState, OperationStatus, OvfProperty, Platform, PlatformError,
    VmProperties,
};

/// Inventory description of a template or VM registered with the mock.
#[derive(Debug, Clone)]
pub struct TemplateFixture {
    pub name: String,
    pub instance_tag: Option<String>,
    pub host_name: String,
    pub disks: Vec<DiskDevice>,
    pub nics: Vec<NicDevice>,
    pub vapp_properties: Option<Vec<OvfProperty>>,
}

impl TemplateFixture {
    /// A template with one 20 GiB disk and one network adapter.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            instance_tag: None,
            host_name: "esx-01".to_string(),
            disks: vec![DiskDevice {
                key: 2000,
                label: "Hard disk 1".to_string(),
                capacity_bytes: 20 * 1024 * 1024 * 1024,
            }],
            nics: vec![NicDevice {
                key: 4000,
                label: "Network adapter 1".to_string(),
            }],
            vapp_properties: None,
        }
    }

    pub fn with_instance_tag(mut self, tag: impl Into<String>) -> Self {
        self.instance_tag = Some(tag.into());
        self
    }

    pub fn with_disks(mut self, disks: Vec<DiskDevice>) -> Self {
        self.disks = disks;
        self
    }

    pub fn with_nics(mut self, nics: Vec<NicDevice>) -> Self {
        self.nics = nics;
        self
    }

    pub fn with_vapp_properties(mut self, props: Vec<OvfProperty>) -> Self {
        self.vapp_properties = Some(props);
        self
    }
}

#[derive(Debug)]
struct MockVm {
    vm: InstanceRef,
    name: String,
    instance_tag: Option<String>,
    host: HostProperties,
    disks: Vec<DiskDevice>,
    nics: Vec<NicDevice>,
    vapp_properties: Option<Vec<OvfProperty>>,
}

#[derive(Debug, Default)]
struct Inner {
    vms: Vec<MockVm>,
    networks: HashMap<String, NetworkBacking>,
    datastores: HashSet<String>,
    pools: HashMap<String, EntityRef>,
    tasks: HashMap<TaskRef, OperationStatus>,
    submissions: Vec<(TaskRef, CloneRequest)>,
}

/// Mock platform for testing and development.
pub struct MockPlatform {
    inner: Mutex<Inner>,
    vm_counter: AtomicU64,
    task_counter: AtomicU64,
    pool_counter: AtomicU64,
    unreachable: AtomicBool,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            vm_counter: AtomicU64::new(0),
            task_counter: AtomicU64::new(0),
            pool_counter: AtomicU64::new(0),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Makes every call fail with a transport error until cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<(), PlatformError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(PlatformError::Query("mock platform unreachable".into()));
        }
        Ok(())
    }

    fn next_vm_ref(&self) -> InstanceRef {
        let n = self.vm_counter.fetch_add(1, Ordering::SeqCst) + 1;
        InstanceRef::new(format!("vm-{n}")).expect("mock vm ref")
    }

    fn next_task_ref(&self) -> TaskRef {
        let n = self.task_counter.fetch_add(1, Ordering::SeqCst) + 1;
        TaskRef::new(format!("task-{n}")).expect("mock task ref")
    }

    /// Registers a template or VM and returns its reference.
    pub fn register_vm(&self, fixture: TemplateFixture) -> InstanceRef {
        let vm = self.next_vm_ref();
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        inner.vms.push(MockVm {
            vm: vm.clone(),
            host: HostProperties {
                host: EntityRef::new(format!("host-{}", fixture.host_name)),
                name: fixture.host_name,
            },
            name: fixture.name,
            instance_tag: fixture.instance_tag,
            disks: fixture.disks,
            nics: fixture.nics,
            vapp_properties: fixture.vapp_properties,
        });
        vm
    }

    pub fn add_network(&self, name: impl Into<String>) {
        let name = name.into();
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        let n = inner.networks.len() + 1;
        inner.networks.insert(
            name.clone(),
            NetworkBacking {
                reference: EntityRef::new(format!("network-{n}")),
                name,
            },
        );
    }

    pub fn add_datastore(&self, name: impl Into<String>) {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        inner.datastores.insert(name.into());
    }

    pub fn add_resource_pool(&self, name: impl Into<String>) -> EntityRef {
        let n = self.pool_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let pool = EntityRef::new(format!("resgroup-{n}"));
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        inner.pools.insert(name.into(), pool.clone());
        pool
    }

    /// Every clone request submitted so far, oldest first.
    pub fn submissions(&self) -> Vec<CloneRequest> {
        let inner = self.inner.lock().expect("mock lock poisoned");
        inner.submissions.iter().map(|(_, r)| r.clone()).collect()
    }

    /// Inserts a task in an arbitrary state, for driving the tracker.
    pub fn insert_task(&self, kind: OperationKind, state: OperationState) -> TaskRef {
        let task = self.next_task_ref();
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        inner.tasks.insert(
            task.clone(),
            OperationStatus {
                state,
                kind,
                result: None,
                entity_name: None,
                message: None,
            },
        );
        task
    }

    /// Moves a submitted clone task to `success`, registering the new VM
    /// (named and tagged per the recorded request) as its result.
    pub fn complete_clone(&self, task: &TaskRef) -> InstanceRef {
        let vm = self.next_vm_ref();
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        let request = inner
            .submissions
            .iter()
            .find(|(t, _)| t == task)
            .map(|(_, r)| r.clone())
            .expect("no submission recorded for task");
        inner.vms.push(MockVm {
            vm: vm.clone(),
            name: request.name.clone(),
            instance_tag: Some(request.config.instance_tag.clone()),
            host: HostProperties {
                host: EntityRef::new("host-esx-01"),
                name: "esx-01".to_string(),
            },
            disks: vec![],
            nics: vec![],
            vapp_properties: None,
        });
        inner.tasks.insert(
            task.clone(),
            OperationStatus {
                state: OperationState::Success,
                kind: OperationKind::Clone,
                result: Some(vm.clone()),
                entity_name: Some(request.name),
                message: None,
            },
        );
        vm
    }

    /// Moves a task to `error` with a fault message.
    pub fn fail_task(&self, task: &TaskRef, message: impl Into<String>) {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        if let Some(status) = inner.tasks.get_mut(task) {
            status.state = OperationState::Error;
            status.message = Some(message.into());
        }
    }

    /// Moves a task to `running`.
    pub fn start_task(&self, task: &TaskRef) {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        if let Some(status) = inner.tasks.get_mut(task) {
            status.state = OperationState::Running;
        }
    }

    /// Overwrites a task's state with an arbitrary remote string.
    pub fn set_task_state(&self, task: &TaskRef, state: OperationState) {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        if let Some(status) = inner.tasks.get_mut(task) {
            status.state = state;
        }
    }

    /// Forgets a task entirely, as the platform does once task history
    /// is pruned.
    pub fn lose_task(&self, task: &TaskRef) {
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        inner.tasks.remove(task);
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn find_by_instance_tag(
        &self,
        tag: &str,
    ) -> Result<Option<InstanceRef>, PlatformError> {
        self.check_reachable()?;
        let inner = self.inner.lock().expect("mock lock poisoned");
        Ok(inner
            .vms
            .iter()
            .find(|v| v.instance_tag.as_deref() == Some(tag))
            .map(|v| v.vm.clone()))
    }

    async fn resolve_vm_by_name(
        &self,
        _datacenter: &str,
        name: &str,
    ) -> Result<InstanceRef, PlatformError> {
        self.check_reachable()?;
        let inner = self.inner.lock().expect("mock lock poisoned");
        inner
            .vms
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.vm.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("virtual machine '{name}'")))
    }

    async fn vm_properties(&self, vm: &InstanceRef) -> Result<VmProperties, PlatformError> {
        self.check_reachable()?;
        let inner = self.inner.lock().expect("mock lock poisoned");
        inner
            .vms
            .iter()
            .find(|v| &v.vm == vm)
            .map(|v| VmProperties {
                vm: v.vm.clone(),
                name: v.name.clone(),
                disks: v.disks.clone(),
                nics: v.nics.clone(),
                vapp_properties: v.vapp_properties.clone(),
            })
            .ok_or_else(|| PlatformError::NotFound(format!("vm '{vm}'")))
    }

    async fn host_of(&self, vm: &InstanceRef) -> Result<HostProperties, PlatformError> {
        self.check_reachable()?;
        let inner = self.inner.lock().expect("mock lock poisoned");
        inner
            .vms
            .iter()
            .find(|v| &v.vm == vm)
            .map(|v| v.host.clone())
            .ok_or_else(|| PlatformError::NotFound(format!("vm '{vm}'")))
    }

    async fn host_root_pool(&self, host: &EntityRef) -> Result<EntityRef, PlatformError> {
        self.check_reachable()?;
        Ok(EntityRef::new(format!("{}-root-pool", host.as_str())))
    }

    async fn resolve_resource_pool(
        &self,
        _datacenter: &str,
        name: &str,
    ) -> Result<Option<EntityRef>, PlatformError> {
        self.check_reachable()?;
        let inner = self.inner.lock().expect("mock lock poisoned");
        Ok(inner.pools.get(name).cloned())
    }

    async fn create_resource_pool(
        &self,
        _root: &EntityRef,
        name: &str,
    ) -> Result<EntityRef, PlatformError> {
        self.check_reachable()?;
        debug!(pool = %name, "[MOCK] Creating resource pool");
        Ok(self.add_resource_pool(name))
    }

    async fn resolve_datastore(
        &self,
        _datacenter: &str,
        name: Option<&str>,
    ) -> Result<EntityRef, PlatformError> {
        self.check_reachable()?;
        match name {
            None => Ok(EntityRef::new("datastore-default")),
            Some(name) => {
                let inner = self.inner.lock().expect("mock lock poisoned");
                if inner.datastores.contains(name) {
                    Ok(EntityRef::new(format!("datastore-{name}")))
                } else {
                    Err(PlatformError::NotFound(format!("datastore '{name}'")))
                }
            }
        }
    }

    async fn resolve_folder(
        &self,
        _datacenter: &str,
        name: Option<&str>,
    ) -> Result<EntityRef, PlatformError> {
        self.check_reachable()?;
        match name {
            None => Ok(EntityRef::new("group-v-default")),
            Some(name) => Ok(EntityRef::new(format!("group-{name}"))),
        }
    }

    async fn resolve_network(
        &self,
        _datacenter: &str,
        name: &str,
    ) -> Result<NetworkBacking, PlatformError> {
        self.check_reachable()?;
        let inner = self.inner.lock().expect("mock lock poisoned");
        inner
            .networks
            .get(name)
            .cloned()
            .ok_or_else(|| PlatformError::NotFound(format!("network '{name}'")))
    }

    async fn operation_status(
        &self,
        task: &TaskRef,
    ) -> Result<Option<OperationStatus>, PlatformError> {
        self.check_reachable()?;
        let inner = self.inner.lock().expect("mock lock poisoned");
        Ok(inner.tasks.get(task).cloned())
    }

    async fn submit_clone(&self, request: &CloneRequest) -> Result<TaskRef, PlatformError> {
        self.check_reachable()?;
        let task = self.next_task_ref();
        debug!(name = %request.name, task = %task, "[MOCK] Submitting clone");
        let mut inner = self.inner.lock().expect("mock lock poisoned");
        inner.tasks.insert(
            task.clone(),
            OperationStatus {
                state: OperationState::Queued,
                kind: OperationKind::Clone,
                result: None,
                entity_name: Some(request.name.clone()),
                message: None,
            },
        );
        inner.submissions.push((task.clone(), request.clone()));
        Ok(task)
    }
}
