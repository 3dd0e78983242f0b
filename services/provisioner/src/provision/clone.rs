//! Clone specification building and submission.
//!
//! Everything here is resolved fresh per invocation: template, placement,
//! payloads, device changes. Any resolution failure aborts the build and
//! no partial specification is ever submitted.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, info, warn};
use vmprov_events::{event_types, NodeEvent};
use vmprov_refs::{is_uuid_like, InstanceRef};

use crate::bootstrap::PayloadError;
use crate::error::{ProvisionError, Reconciliation};
use crate::model::{ClusterRecord, CustomizationMode, DiskResize, NodeRecord, NodeSpec};
use crate::platform::{
    CloneConfig, ClonePlacement, CloneRequest, DeviceChange, DiskDevice, EntityRef,
    ExtraConfigPair, HostProperties, NetworkBacking, NicDevice, OvfPropertyEdit, VmProperties,
    DISK_MOVE_ALL_CONSOLIDATE,
};
use crate::provision::Provisioner;

/// First synthetic device key handed to an added adapter. Subsequent
/// adapters count downward so keys never collide with real devices.
const NIC_KEY_START: i32 = -100;

/// Extra-config keys for platform-native guest configuration.
const GUESTINFO_METADATA: &str = "guestinfo.metadata";
const GUESTINFO_METADATA_ENCODING: &str = "guestinfo.metadata.encoding";
const GUESTINFO_USERDATA: &str = "guestinfo.userdata";
const GUESTINFO_USERDATA_ENCODING: &str = "guestinfo.userdata.encoding";

/// OVF property ids overwritten with computed values; everything else a
/// template declares is carried over with its existing default.
const OVF_USER_DATA: &str = "user-data";
const OVF_PUBLIC_KEYS: &str = "public-keys";
const OVF_HOSTNAME: &str = "hostname";

impl Provisioner {
    /// Builds and submits a clone for `node`, persisting the returned
    /// operation reference as the node's task reference.
    pub(crate) async fn clone_node(
        &self,
        cluster: &ClusterRecord,
        node: &NodeRecord,
    ) -> Result<Reconciliation, ProvisionError> {
        let spec = &node.spec;

        let template = self.resolve_template(spec).await?;
        let props = self.platform.vm_properties(&template).await?;
        let host = self.platform.host_of(&template).await?;

        // Direct host/cluster deployment: with no pool named, the clone
        // lands in the host's root pool and the payloads get the
        // computed pool path instead.
        let pool_path_override = if spec.resource_pool.is_none() {
            let path = format!("/{}/host/{}/Resource", spec.datacenter, host.name);
            info!(path = %path, "Deploying directly to host root resource pool");
            Some(path)
        } else {
            None
        };

        // Payloads come first so that a not-ready dependency is
        // discovered before anything else is resolved.
        let user_data = match self
            .payloads
            .user_data(cluster, node, pool_path_override.as_deref())
            .await
        {
            Ok(data) => data,
            Err(PayloadError::NotReady { retry_after }) => {
                info!(node_id = %node.id, delay_secs = retry_after.as_secs(), "Bootstrap user-data not ready");
                return Ok(Reconciliation::RetryAfter(retry_after));
            }
            Err(err) => return Err(err.into()),
        };
        let meta_data = match self.payloads.meta_data(cluster, node).await {
            Ok(data) => data,
            Err(PayloadError::NotReady { retry_after }) => {
                info!(node_id = %node.id, delay_secs = retry_after.as_secs(), "Bootstrap meta-data not ready");
                return Ok(Reconciliation::RetryAfter(retry_after));
            }
            Err(err) => return Err(err.into()),
        };
        let user_data_b64 = BASE64.encode(&user_data);
        let meta_data_b64 = BASE64.encode(&meta_data);

        let folder = self
            .platform
            .resolve_folder(&spec.datacenter, spec.vm_folder.as_deref())
            .await?;
        let datastore = self
            .platform
            .resolve_datastore(&spec.datacenter, spec.datastore.as_deref())
            .await?;
        let pool = self.resolve_pool(spec, &host).await?;

        let mut device_changes = disk_device_changes(&props.disks, &spec.disks, &spec.template)?;
        let backings = self.resolve_network_backings(spec).await?;
        device_changes.extend(nic_device_changes(&props.nics, &backings));

        let (extra_config, vapp_property_edits) = match spec.customization {
            CustomizationMode::GuestInfoMetadata => {
                (guestinfo_extra_config(&user_data_b64, &meta_data_b64), vec![])
            }
            CustomizationMode::OvfProperties => {
                let public_key = self.payloads.ssh_public_key(cluster).await?;
                let edits = ovf_property_edits(
                    &props,
                    &spec.template,
                    &user_data_b64,
                    &public_key,
                    &node.name,
                )?;
                (vec![], edits)
            }
        };

        let request = CloneRequest {
            source: template,
            name: node.name.clone(),
            folder,
            placement: ClonePlacement {
                datastore,
                pool,
                disk_move_type: DISK_MOVE_ALL_CONSOLIDATE.to_string(),
            },
            config: CloneConfig {
                instance_tag: node.instance_tag(),
                num_cpus: (spec.num_cpus > 0).then_some(spec.num_cpus),
                memory_mib: (spec.memory_mib > 0).then_some(spec.memory_mib),
                annotation: format!(
                    "Virtual machine is part of the cluster {} managed by vmprov",
                    cluster.name
                ),
                disk_uuid_enabled: true,
                device_changes,
                extra_config,
                vapp_property_edits,
            },
            power_on: true,
        };

        self.record(NodeEvent::normal(
            node.id,
            &node.name,
            event_types::NODE_CREATING,
            format!("Creating node {}", node.name),
        ));
        let task = self.platform.submit_clone(&request).await?;
        info!(node_id = %node.id, task = %task, "Clone submitted");
        self.set_task_ref(node, Some(task)).await?;
        Ok(Reconciliation::Done)
    }

    /// Resolves the source template. A UUID-shaped identifier is first
    /// tried as an instance tag, falling back to a name lookup; this
    /// tolerates both a moved/renamed template and an operator-supplied
    /// friendly name.
    async fn resolve_template(&self, spec: &NodeSpec) -> Result<InstanceRef, ProvisionError> {
        if is_uuid_like(&spec.template) {
            debug!(template = %spec.template, "Trying template as instance tag");
            if let Some(vm) = self.platform.find_by_instance_tag(&spec.template).await? {
                return Ok(vm);
            }
        }
        debug!(template = %spec.template, "Resolving template by name");
        Ok(self
            .platform
            .resolve_vm_by_name(&spec.datacenter, &spec.template)
            .await?)
    }

    /// Resolves the placement resource pool. A named pool that does not
    /// exist yet is created under the host's root pool with platform
    /// default settings.
    async fn resolve_pool(
        &self,
        spec: &NodeSpec,
        host: &HostProperties,
    ) -> Result<EntityRef, ProvisionError> {
        match &spec.resource_pool {
            Some(name) => {
                if let Some(pool) = self
                    .platform
                    .resolve_resource_pool(&spec.datacenter, name)
                    .await?
                {
                    return Ok(pool);
                }
                warn!(pool = %name, "Resource pool not found, creating it with default settings");
                let root = self.platform.host_root_pool(&host.host).await?;
                Ok(self.platform.create_resource_pool(&root, name).await?)
            }
            None => Ok(self.platform.host_root_pool(&host.host).await?),
        }
    }

    async fn resolve_network_backings(
        &self,
        spec: &NodeSpec,
    ) -> Result<Vec<NetworkBacking>, ProvisionError> {
        let mut backings = Vec::with_capacity(spec.networks.len());
        for network in &spec.networks {
            backings.push(
                self.platform
                    .resolve_network(&spec.datacenter, &network.name)
                    .await?,
            );
        }
        Ok(backings)
    }
}

/// Converts a directive size to the byte capacity sent to the platform.
pub(crate) fn gib_to_bytes(gib: u64) -> i64 {
    (gib as i64) * 1024 * 1024 * 1024
}

/// Computes disk resize edits by matching directives against template
/// disks by label.
///
/// Partial matches are allowed; a template disk without a directive is
/// left alone. A shrink is rejected outright, and a non-empty directive
/// set that matches nothing is rejected so a typo'd label cannot turn
/// into a silent no-op.
fn disk_device_changes(
    template_disks: &[DiskDevice],
    directives: &[DiskResize],
    template: &str,
) -> Result<Vec<DeviceChange>, ProvisionError> {
    let mut changes = Vec::new();
    for disk in template_disks {
        let Some(directive) = directives.iter().find(|d| d.label == disk.label) else {
            continue;
        };
        let capacity_bytes = gib_to_bytes(directive.size_gib);
        if disk.capacity_bytes > capacity_bytes {
            return Err(ProvisionError::Config(format!(
                "disk '{}' resize to {} GiB is below the template's current size; \
                 disks can only grow",
                disk.label, directive.size_gib
            )));
        }
        debug!(disk = %disk.label, size_gib = directive.size_gib, "Resizing disk");
        changes.push(DeviceChange::EditDisk {
            key: disk.key,
            label: disk.label.clone(),
            capacity_bytes,
        });
    }
    if changes.is_empty() && !directives.is_empty() {
        return Err(ProvisionError::Config(format!(
            "none of the disk resize directives matched a disk on template '{template}'"
        )));
    }
    Ok(changes)
}

/// Removes every adapter inherited from the template and appends one new
/// adapter per resolved network, keyed with sequential synthetic ids.
fn nic_device_changes(
    template_nics: &[NicDevice],
    backings: &[NetworkBacking],
) -> Vec<DeviceChange> {
    let mut changes: Vec<DeviceChange> = template_nics
        .iter()
        .map(|nic| DeviceChange::RemoveNic { key: nic.key })
        .collect();
    let mut key = NIC_KEY_START;
    for backing in backings {
        changes.push(DeviceChange::AddNic {
            key,
            backing: backing.clone(),
        });
        key -= 1;
    }
    changes
}

/// Builds the extra-config pairs for platform-native guest configuration.
/// Values arrive already base64-encoded; the explicit encoding markers
/// tell the guest datasource how to decode them.
fn guestinfo_extra_config(user_data_b64: &str, meta_data_b64: &str) -> Vec<ExtraConfigPair> {
    vec![
        ExtraConfigPair {
            key: GUESTINFO_METADATA.to_string(),
            value: meta_data_b64.to_string(),
        },
        ExtraConfigPair {
            key: GUESTINFO_METADATA_ENCODING.to_string(),
            value: "base64".to_string(),
        },
        ExtraConfigPair {
            key: GUESTINFO_USERDATA.to_string(),
            value: user_data_b64.to_string(),
        },
        ExtraConfigPair {
            key: GUESTINFO_USERDATA_ENCODING.to_string(),
            value: "base64".to_string(),
        },
    ]
}

/// Builds the OVF property edits for the legacy customization mode.
///
/// Every property the template declares is carried over with its
/// existing default (a blank default becomes a single space so the edit
/// is not dropped), except the three well-known ids which are overwritten
/// with computed values.
fn ovf_property_edits(
    props: &VmProperties,
    template: &str,
    user_data_b64: &str,
    public_key: &str,
    hostname: &str,
) -> Result<Vec<OvfPropertyEdit>, ProvisionError> {
    let Some(declared) = &props.vapp_properties else {
        return Err(ProvisionError::Config(format!(
            "template '{template}' has no guest-configurable property set and cannot be customized"
        )));
    };
    Ok(declared
        .iter()
        .map(|p| {
            let value = match p.id.as_str() {
                OVF_USER_DATA => user_data_b64.to_string(),
                OVF_PUBLIC_KEYS => public_key.to_string(),
                OVF_HOSTNAME => hostname.to_string(),
                _ if p.default_value.is_empty() => " ".to_string(),
                _ => p.default_value.clone(),
            };
            OvfPropertyEdit {
                key: p.key,
                id: p.id.clone(),
                value,
            }
        })
        .collect())
}
