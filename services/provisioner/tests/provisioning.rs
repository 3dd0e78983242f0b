//! Integration tests for the provisioning flow.
//!
//! These tests drive the provisioner through full reconcile invocations
//! against the mock platform and the in-memory store:
//! 1. Fresh node: exactly one clone submitted, task reference persisted
//! 2. In-flight task: retry-after, no mutation
//! 3. Completed task: instance reference recorded, reference cleared,
//!    further reconciles idempotent
//! 4. Failure paths: configuration errors, lost references, unknown
//!    remote states

use std::sync::Arc;
use std::time::Duration;

use vmprov_events::{event_types, MemoryRecorder};
use vmprov_provisioner::bootstrap::FixedPayloads;
use vmprov_provisioner::error::{ProvisionError, Reconciliation};
use vmprov_provisioner::model::{
    ApiStatus, ClusterRecord, ClusterSpec, CustomizationMode, DiskResize, NetworkAttachment,
    NodeRecord, NodeRole, NodeSpec,
};
use vmprov_provisioner::platform::{
    DeviceChange, DiskDevice, MockPlatform, NicDevice, OperationKind, OperationState,
    OvfProperty, TemplateFixture,
};
use vmprov_provisioner::store::{InMemoryStore, RecordStore};
use vmprov_provisioner::{Provisioner, ProvisionerConfig};

const POLL: Duration = Duration::from_secs(5);

struct Harness {
    platform: Arc<MockPlatform>,
    store: Arc<InMemoryStore>,
    recorder: Arc<MemoryRecorder>,
    provisioner: Provisioner,
    cluster: ClusterRecord,
}

impl Harness {
    async fn new() -> Self {
        let platform = Arc::new(MockPlatform::new());
        let store = Arc::new(InMemoryStore::new());
        let recorder = Arc::new(MemoryRecorder::new());
        let provisioner = Provisioner::new(
            platform.clone(),
            store.clone(),
            Arc::new(FixedPayloads::new()),
            recorder.clone(),
            ProvisionerConfig {
                task_poll_interval: POLL,
            },
        );
        let cluster = store
            .insert_cluster(ClusterRecord::new(
                "c0",
                ClusterSpec {
                    server: "https://vc.example.test".to_string(),
                    username: "admin".to_string(),
                    password: "secret".to_string(),
                    insecure: true,
                    default_network: None,
                    api_status: ApiStatus::Ready,
                },
            ))
            .await;
        Self {
            platform,
            store,
            recorder,
            provisioner,
            cluster,
        }
    }

    async fn insert_node(&self, spec: NodeSpec) -> NodeRecord {
        self.store
            .insert_node(NodeRecord::new("worker-0", spec))
            .await
    }

    async fn reconcile(&self, node: &NodeRecord) -> Result<Reconciliation, ProvisionError> {
        self.provisioner.reconcile(&self.cluster, node).await
    }

    async fn current(&self, node: &NodeRecord) -> NodeRecord {
        self.store.get_node(node.id).await.unwrap()
    }
}

fn base_spec(template: &str) -> NodeSpec {
    serde_json::from_str(&format!(
        r#"{{"template": "{template}", "datacenter": "dc0"}}"#
    ))
    .unwrap()
}

#[tokio::test]
async fn test_fresh_node_submits_exactly_one_clone_and_persists_reference() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    let outcome = h.reconcile(&node).await.unwrap();

    assert!(outcome.is_done());
    assert_eq!(h.platform.submissions().len(), 1);
    let stored = h.current(&node).await;
    assert!(stored.status.task_ref.is_some());
    assert!(stored.status.instance_ref.is_none());
    assert_eq!(h.recorder.event_types(), vec![event_types::NODE_CREATING]);

    let request = &h.platform.submissions()[0];
    assert_eq!(request.name, "worker-0");
    assert_eq!(request.config.instance_tag, node.id.to_string());
    assert!(request.power_on);
    // Unset sizing inherits the template values.
    assert_eq!(request.config.num_cpus, None);
    assert_eq!(request.config.memory_mib, None);
}

#[tokio::test]
async fn test_running_task_returns_retry_delay_without_mutation() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    h.reconcile(&node).await.unwrap();
    let tracked = h.current(&node).await;
    let task = tracked.status.task_ref.clone().unwrap();
    h.platform.start_task(&task);

    let outcome = h.reconcile(&tracked).await.unwrap();

    assert_eq!(outcome.retry_delay(), Some(POLL));
    let after = h.current(&node).await;
    assert_eq!(after.generation, tracked.generation);
    assert_eq!(after.status.task_ref, Some(task));
    assert_eq!(h.platform.submissions().len(), 1);
}

#[tokio::test]
async fn test_completed_clone_records_instance_and_clears_task() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    h.reconcile(&node).await.unwrap();
    let tracked = h.current(&node).await;
    let task = tracked.status.task_ref.clone().unwrap();
    let vm = h.platform.complete_clone(&task);

    let outcome = h.reconcile(&tracked).await.unwrap();

    assert!(outcome.is_done());
    let done = h.current(&node).await;
    assert_eq!(done.status.instance_ref, Some(vm));
    assert_eq!(done.status.task_ref, None);
    assert!(done.status.last_updated.is_some());
    assert!(h
        .recorder
        .event_types()
        .contains(&event_types::NODE_CREATED.to_string()));
}

#[tokio::test]
async fn test_reconcile_after_completion_is_idempotent() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    h.reconcile(&node).await.unwrap();
    let tracked = h.current(&node).await;
    let task = tracked.status.task_ref.clone().unwrap();
    h.platform.complete_clone(&task);
    h.reconcile(&tracked).await.unwrap();

    // The VM now resolves by identity tag: no task reference is stored,
    // and re-invoking must not submit another clone.
    let done = h.current(&node).await;
    let outcome = h.reconcile(&done).await.unwrap();

    assert!(outcome.is_done());
    assert_eq!(h.platform.submissions().len(), 1);
    assert_eq!(h.current(&node).await.generation, done.generation);
}

#[tokio::test]
async fn test_vm_created_by_a_run_that_lost_its_reference_is_adopted() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;
    // A previous run cloned the VM and died before persisting the task
    // reference; only the instance tag survives, on the platform side.
    let vm = h.platform.register_vm(
        TemplateFixture::named("worker-0").with_instance_tag(node.id.to_string()),
    );

    let outcome = h.reconcile(&node).await.unwrap();

    assert!(outcome.is_done());
    assert!(h.platform.submissions().is_empty());
    let stored = h.current(&node).await;
    assert_eq!(stored.status.instance_ref, Some(vm));
    assert_eq!(h.recorder.event_types(), vec![event_types::NODE_CREATED]);
}

#[tokio::test]
async fn test_disk_shrink_fails_before_submission() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl").with_disks(vec![DiskDevice {
        key: 2000,
        label: "data".to_string(),
        capacity_bytes: 50 * 1024 * 1024 * 1024,
    }]));
    let mut spec = base_spec("tpl");
    spec.disks = vec![DiskResize {
        label: "data".to_string(),
        size_gib: 20,
    }];
    let node = h.insert_node(spec).await;

    let err = h.reconcile(&node).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Config(_)));
    assert!(h.platform.submissions().is_empty());
    assert!(h.current(&node).await.status.task_ref.is_none());
}

#[tokio::test]
async fn test_unmatched_disk_directives_fail_before_submission() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let mut spec = base_spec("tpl");
    spec.disks = vec![DiskResize {
        label: "no-such-disk".to_string(),
        size_gib: 100,
    }];
    let node = h.insert_node(spec).await;

    let err = h.reconcile(&node).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Config(_)));
    assert!(h.platform.submissions().is_empty());
}

#[tokio::test]
async fn test_disk_resize_emits_edit_with_exact_capacity() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl").with_disks(vec![DiskDevice {
        key: 2000,
        label: "data".to_string(),
        capacity_bytes: 50 * 1024 * 1024 * 1024,
    }]));
    let mut spec = base_spec("tpl");
    spec.disks = vec![DiskResize {
        label: "data".to_string(),
        size_gib: 100,
    }];
    let node = h.insert_node(spec).await;

    h.reconcile(&node).await.unwrap();

    let request = &h.platform.submissions()[0];
    let edits: Vec<_> = request
        .config
        .device_changes
        .iter()
        .filter_map(|c| match c {
            DeviceChange::EditDisk {
                label,
                capacity_bytes,
                ..
            } => Some((label.as_str(), *capacity_bytes)),
            _ => None,
        })
        .collect();
    assert_eq!(edits, vec![("data", 107_374_182_400)]);
}

#[tokio::test]
async fn test_network_replacement_removes_all_and_adds_each_configured() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl").with_nics(vec![
        NicDevice {
            key: 4000,
            label: "Network adapter 1".to_string(),
        },
        NicDevice {
            key: 4001,
            label: "Network adapter 2".to_string(),
        },
    ]));
    h.platform.add_network("frontend");
    h.platform.add_network("backend");
    h.platform.add_network("storage");
    let mut spec = base_spec("tpl");
    spec.networks = vec![
        NetworkAttachment {
            name: "frontend".to_string(),
        },
        NetworkAttachment {
            name: "backend".to_string(),
        },
        NetworkAttachment {
            name: "storage".to_string(),
        },
    ];
    let node = h.insert_node(spec).await;

    h.reconcile(&node).await.unwrap();

    let request = &h.platform.submissions()[0];
    let removes = request
        .config
        .device_changes
        .iter()
        .filter(|c| matches!(c, DeviceChange::RemoveNic { .. }))
        .count();
    let adds: Vec<&str> = request
        .config
        .device_changes
        .iter()
        .filter_map(|c| match c {
            DeviceChange::AddNic { backing, .. } => Some(backing.name.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(removes, 2);
    assert_eq!(adds, vec!["frontend", "backend", "storage"]);
}

#[tokio::test]
async fn test_no_networks_still_removes_template_adapters() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    h.reconcile(&node).await.unwrap();

    let request = &h.platform.submissions()[0];
    assert!(request
        .config
        .device_changes
        .iter()
        .all(|c| matches!(c, DeviceChange::RemoveNic { .. })));
    assert_eq!(request.config.device_changes.len(), 1);
}

#[tokio::test]
async fn test_lost_task_reference_clears_quietly() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    h.reconcile(&node).await.unwrap();
    let tracked = h.current(&node).await;
    let task = tracked.status.task_ref.clone().unwrap();
    h.platform.lose_task(&task);
    let events_before = h.recorder.events().len();

    let outcome = h.reconcile(&tracked).await.unwrap();

    assert!(outcome.is_done());
    assert_eq!(h.current(&node).await.status.task_ref, None);
    // No failure notification for a vanished operation.
    assert_eq!(h.recorder.events().len(), events_before);
}

#[tokio::test]
async fn test_unknown_remote_state_is_a_hard_error_and_preserves_reference() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    h.reconcile(&node).await.unwrap();
    let tracked = h.current(&node).await;
    let task = tracked.status.task_ref.clone().unwrap();
    h.platform
        .set_task_state(&task, OperationState::Other("paused".to_string()));

    let err = h.reconcile(&tracked).await.unwrap_err();

    assert!(matches!(err, ProvisionError::UnknownTaskState { .. }));
    assert_eq!(h.current(&node).await.status.task_ref, Some(task));
}

#[tokio::test]
async fn test_failed_clone_emits_failure_and_enables_retry() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    h.reconcile(&node).await.unwrap();
    let tracked = h.current(&node).await;
    let task = tracked.status.task_ref.clone().unwrap();
    h.platform.fail_task(&task, "insufficient disk space");

    let outcome = h.reconcile(&tracked).await.unwrap();

    assert!(outcome.is_done());
    let after = h.current(&node).await;
    assert_eq!(after.status.task_ref, None);
    assert!(h
        .recorder
        .event_types()
        .contains(&event_types::NODE_CREATE_FAILED.to_string()));

    // With the reference cleared, the next reconcile submits a fresh clone.
    h.reconcile(&after).await.unwrap();
    assert_eq!(h.platform.submissions().len(), 2);
}

#[tokio::test]
async fn test_reconfigure_completion_emits_event_and_clears_reference() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;
    let task = h
        .platform
        .insert_task(OperationKind::Reconfigure, OperationState::Success);
    let tracked = h
        .store
        .update_node_status(&vmprov_provisioner::provision::with_task_ref(
            &node,
            Some(task),
        ))
        .await
        .unwrap();

    let outcome = h.reconcile(&tracked).await.unwrap();

    assert!(outcome.is_done());
    assert_eq!(h.current(&node).await.status.task_ref, None);
    assert_eq!(
        h.recorder.event_types(),
        vec![event_types::NODE_RECONFIGURED]
    );
}

#[tokio::test]
async fn test_worker_payloads_not_ready_maps_to_retry_signal() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let mut cluster = h.cluster.clone();
    cluster.spec.api_status = ApiStatus::Pending;
    let node = h.insert_node(base_spec("tpl")).await;

    let outcome = h.provisioner.reconcile(&cluster, &node).await.unwrap();

    assert!(outcome.retry_delay().is_some());
    assert!(h.platform.submissions().is_empty());
    assert!(h.current(&node).await.status.task_ref.is_none());
}

#[tokio::test]
async fn test_missing_control_plane_version_is_a_config_error() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let mut spec = base_spec("tpl");
    spec.role = NodeRole::ControlPlane;
    let node = h.insert_node(spec).await;

    let err = h.reconcile(&node).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Config(_)));
    assert!(h.platform.submissions().is_empty());
}

#[tokio::test]
async fn test_guestinfo_customization_injects_encoded_payloads() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;

    h.reconcile(&node).await.unwrap();

    let request = &h.platform.submissions()[0];
    let keys: Vec<&str> = request
        .config
        .extra_config
        .iter()
        .map(|p| p.key.as_str())
        .collect();
    assert_eq!(
        keys,
        vec![
            "guestinfo.metadata",
            "guestinfo.metadata.encoding",
            "guestinfo.userdata",
            "guestinfo.userdata.encoding",
        ]
    );
    assert!(request.config.vapp_property_edits.is_empty());
}

#[tokio::test]
async fn test_ovf_customization_requires_declared_property_set() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let mut spec = base_spec("tpl");
    spec.customization = CustomizationMode::OvfProperties;
    let node = h.insert_node(spec).await;

    let err = h.reconcile(&node).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Config(_)));
    assert!(h.platform.submissions().is_empty());
}

#[tokio::test]
async fn test_ovf_customization_overwrites_well_known_properties() {
    let h = Harness::new().await;
    h.platform
        .register_vm(TemplateFixture::named("tpl").with_vapp_properties(vec![
            OvfProperty {
                key: 1,
                id: "user-data".to_string(),
                default_value: String::new(),
            },
            OvfProperty {
                key: 2,
                id: "hostname".to_string(),
                default_value: "template".to_string(),
            },
            OvfProperty {
                key: 3,
                id: "ntp".to_string(),
                default_value: "pool.ntp.org".to_string(),
            },
        ]));
    let mut spec = base_spec("tpl");
    spec.customization = CustomizationMode::OvfProperties;
    let node = h.insert_node(spec).await;

    h.reconcile(&node).await.unwrap();

    let request = &h.platform.submissions()[0];
    let edits = &request.config.vapp_property_edits;
    assert!(request.config.extra_config.is_empty());
    assert_eq!(edits.len(), 3);
    assert_eq!(edits[1].value, "worker-0");
    assert_eq!(edits[2].value, "pool.ntp.org");
    // user-data is base64 of whatever the payload source produced.
    assert!(!edits[0].value.is_empty());
    assert_ne!(edits[0].value, " ");
}

#[tokio::test]
async fn test_named_pool_is_created_when_missing() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let mut spec = base_spec("tpl");
    spec.resource_pool = Some("workers".to_string());
    let node = h.insert_node(spec).await;

    h.reconcile(&node).await.unwrap();

    // Auto-created on first use, resolvable afterwards.
    use vmprov_provisioner::platform::Platform;
    let pool = h
        .platform
        .resolve_resource_pool("dc0", "workers")
        .await
        .unwrap();
    assert!(pool.is_some());
    assert_eq!(h.platform.submissions()[0].placement.pool, pool.unwrap());
}

#[tokio::test]
async fn test_explicit_datastore_is_resolved_into_placement() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    h.platform.add_datastore("fast-ssd");
    let mut spec = base_spec("tpl");
    spec.datastore = Some("fast-ssd".to_string());
    let node = h.insert_node(spec).await;

    h.reconcile(&node).await.unwrap();

    let request = &h.platform.submissions()[0];
    assert_eq!(
        request.placement.datastore,
        vmprov_provisioner::platform::EntityRef::new("datastore-fast-ssd")
    );
    assert_eq!(
        request.placement.disk_move_type,
        vmprov_provisioner::platform::DISK_MOVE_ALL_CONSOLIDATE
    );
}

#[tokio::test]
async fn test_unresolvable_network_aborts_build() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let mut spec = base_spec("tpl");
    spec.networks = vec![NetworkAttachment {
        name: "missing-net".to_string(),
    }];
    let node = h.insert_node(spec).await;

    let err = h.reconcile(&node).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Platform(_)));
    assert!(h.platform.submissions().is_empty());
}

#[tokio::test]
async fn test_sizing_overrides_only_when_set() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let mut spec = base_spec("tpl");
    spec.num_cpus = 8;
    spec.memory_mib = 16384;
    let node = h.insert_node(spec).await;

    h.reconcile(&node).await.unwrap();

    let request = &h.platform.submissions()[0];
    assert_eq!(request.config.num_cpus, Some(8));
    assert_eq!(request.config.memory_mib, Some(16384));
}

#[tokio::test]
async fn test_template_resolution_prefers_instance_tag_for_uuid() {
    let h = Harness::new().await;
    let uuid = "52260a73-a4eb-9df8-6b2c-4a0d79f79a25";
    // The UUID resolves as an instance tag even though another template
    // carries it as a display name.
    let tagged = h
        .platform
        .register_vm(TemplateFixture::named("tpl-moved").with_instance_tag(uuid));
    h.platform.register_vm(TemplateFixture::named(uuid));
    let node = h.insert_node(base_spec(uuid)).await;

    h.reconcile(&node).await.unwrap();

    assert_eq!(h.platform.submissions()[0].source, tagged);
}

#[tokio::test]
async fn test_platform_outage_surfaces_as_error_without_state_change() {
    let h = Harness::new().await;
    h.platform.register_vm(TemplateFixture::named("tpl"));
    let node = h.insert_node(base_spec("tpl")).await;
    h.platform.set_unreachable(true);

    let err = h.reconcile(&node).await.unwrap_err();

    assert!(matches!(err, ProvisionError::Platform(_)));
    let stored = h.current(&node).await;
    assert_eq!(stored.generation, node.generation);
    assert!(stored.status.task_ref.is_none());
}
