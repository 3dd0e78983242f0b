//! Guest bootstrap payload interface.
//!
//! Payload generation (startup-script and metadata templating) is an
//! external collaborator. The provisioner treats payloads as opaque byte
//! blobs: it base64-encodes whatever it receives at injection time and
//! never interprets the content. The one piece of shared vocabulary is
//! [`PayloadError::NotReady`], which the reconciler maps to a retry
//! signal instead of a failure.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{ApiStatus, ClusterRecord, NodeRecord};

/// Errors from payload generation.
#[derive(Debug, Error)]
pub enum PayloadError {
    /// A dependency is not ready yet (cluster API still coming up, join
    /// token not issuable). Not a failure: re-invoke after the delay.
    #[error("bootstrap payloads not ready, retry in {retry_after:?}")]
    NotReady { retry_after: Duration },

    /// The declared configuration cannot produce a payload.
    #[error("{0}")]
    Config(String),

    #[error("payload rendering failed: {0}")]
    Render(String),
}

/// Source of guest bootstrap payloads.
#[async_trait]
pub trait PayloadSource: Send + Sync {
    /// Full cloud-init user-data for the node, with the cloud provider
    /// configuration embedded. When the node deploys directly to a
    /// host's root pool, `resource_pool_override` carries the computed
    /// pool path so the embedded config points at the right place.
    async fn user_data(
        &self,
        cluster: &ClusterRecord,
        node: &NodeRecord,
        resource_pool_override: Option<&str>,
    ) -> Result<Vec<u8>, PayloadError>;

    /// Instance metadata for the node.
    async fn meta_data(
        &self,
        cluster: &ClusterRecord,
        node: &NodeRecord,
    ) -> Result<Vec<u8>, PayloadError>;

    /// The cloud provider configuration on its own.
    async fn cloud_provider_config(
        &self,
        cluster: &ClusterRecord,
        node: &NodeRecord,
        resource_pool_override: Option<&str>,
    ) -> Result<Vec<u8>, PayloadError>;

    /// Public key material installed into the guest.
    async fn ssh_public_key(&self, cluster: &ClusterRecord) -> Result<String, PayloadError>;
}

/// Payload source returning fixed blobs, for tests and development.
///
/// It still enforces the generation preconditions a real templating
/// implementation has: a control-plane node must declare its
/// control-plane version, and a worker cannot be rendered before the
/// cluster API is ready.
#[derive(Debug, Clone)]
pub struct FixedPayloads {
    pub user_data: Vec<u8>,
    pub meta_data: Vec<u8>,
    pub cloud_provider_config: Vec<u8>,
    pub ssh_public_key: String,

    /// Delay suggested when a worker's dependencies are not ready.
    pub not_ready_delay: Duration,
}

impl Default for FixedPayloads {
    fn default() -> Self {
        Self {
            user_data: b"#cloud-config\n".to_vec(),
            meta_data: b"instance-id: unset\n".to_vec(),
            cloud_provider_config: b"[Global]\n".to_vec(),
            ssh_public_key: "ssh-ed25519 AAAATESTKEY".to_string(),
            not_ready_delay: Duration::from_secs(30),
        }
    }
}

impl FixedPayloads {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_renderable(
        &self,
        cluster: &ClusterRecord,
        node: &NodeRecord,
    ) -> Result<(), PayloadError> {
        if node.spec.role.is_control_plane() {
            if node.spec.versions.control_plane.is_none() {
                return Err(PayloadError::Config(
                    "invalid control plane configuration: missing control plane version"
                        .to_string(),
                ));
            }
        } else if cluster.spec.api_status != ApiStatus::Ready {
            return Err(PayloadError::NotReady {
                retry_after: self.not_ready_delay,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PayloadSource for FixedPayloads {
    async fn user_data(
        &self,
        cluster: &ClusterRecord,
        node: &NodeRecord,
        resource_pool_override: Option<&str>,
    ) -> Result<Vec<u8>, PayloadError> {
        self.check_renderable(cluster, node)?;
        let mut data = self.user_data.clone();
        data.extend_from_slice(
            &self
                .cloud_provider_config(cluster, node, resource_pool_override)
                .await?,
        );
        Ok(data)
    }

    async fn meta_data(
        &self,
        _cluster: &ClusterRecord,
        _node: &NodeRecord,
    ) -> Result<Vec<u8>, PayloadError> {
        Ok(self.meta_data.clone())
    }

    async fn cloud_provider_config(
        &self,
        _cluster: &ClusterRecord,
        node: &NodeRecord,
        resource_pool_override: Option<&str>,
    ) -> Result<Vec<u8>, PayloadError> {
        let mut config = self.cloud_provider_config.clone();
        let pool = resource_pool_override
            .map(str::to_string)
            .or_else(|| node.spec.resource_pool.clone());
        if let Some(pool) = pool {
            config.extend_from_slice(format!("resourcepool-path = \"{pool}\"\n").as_bytes());
        }
        Ok(config)
    }

    async fn ssh_public_key(&self, _cluster: &ClusterRecord) -> Result<String, PayloadError> {
        Ok(self.ssh_public_key.clone())
    }
}
