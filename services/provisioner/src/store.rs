//! Declarative record store interface.
//!
//! The store owns node and cluster records; the provisioner only reads
//! them and writes status back. Every write may race another writer, so
//! updates carry the generation the caller read and the store rejects
//! stale writes with a conflict the caller can retry from a fresh read.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use vmprov_refs::{ClusterId, NodeId};

use crate::model::{ClusterRecord, NodeRecord};

/// Errors from the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("cluster not found: {0}")]
    ClusterNotFound(ClusterId),

    /// The record changed since the caller read it. Re-read and retry.
    #[error("conflict updating node {node}: stored generation {stored}, caller had {caller}")]
    Conflict {
        node: NodeId,
        stored: u64,
        caller: u64,
    },

    #[error("store error: {0}")]
    Internal(String),
}

impl StoreError {
    /// Returns true if the caller should re-read and retry.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// The declarative record store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_node(&self, id: NodeId) -> Result<NodeRecord, StoreError>;

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError>;

    async fn get_cluster(&self, id: ClusterId) -> Result<ClusterRecord, StoreError>;

    /// Replaces the node's spec, leaving status untouched. Returns the
    /// stored record with its new generation.
    async fn update_node_spec(&self, node: &NodeRecord) -> Result<NodeRecord, StoreError>;

    /// Replaces the node's status, leaving spec untouched. Returns the
    /// stored record with its new generation.
    async fn update_node_status(&self, node: &NodeRecord) -> Result<NodeRecord, StoreError>;
}

/// In-memory store with optimistic concurrency, for tests and development.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    nodes: RwLock<HashMap<NodeId, NodeRecord>>,
    clusters: RwLock<HashMap<ClusterId, ClusterRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a node record, returning it as stored.
    pub async fn insert_node(&self, node: NodeRecord) -> NodeRecord {
        let mut nodes = self.nodes.write().await;
        nodes.insert(node.id, node.clone());
        node
    }

    /// Seeds a cluster record, returning it as stored.
    pub async fn insert_cluster(&self, cluster: ClusterRecord) -> ClusterRecord {
        let mut clusters = self.clusters.write().await;
        clusters.insert(cluster.id, cluster.clone());
        cluster
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get_node(&self, id: NodeId) -> Result<NodeRecord, StoreError> {
        let nodes = self.nodes.read().await;
        nodes.get(&id).cloned().ok_or(StoreError::NodeNotFound(id))
    }

    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, StoreError> {
        let nodes = self.nodes.read().await;
        let mut all: Vec<_> = nodes.values().cloned().collect();
        all.sort_by_key(|n| n.id);
        Ok(all)
    }

    async fn get_cluster(&self, id: ClusterId) -> Result<ClusterRecord, StoreError> {
        let clusters = self.clusters.read().await;
        clusters
            .get(&id)
            .cloned()
            .ok_or(StoreError::ClusterNotFound(id))
    }

    async fn update_node_spec(&self, node: &NodeRecord) -> Result<NodeRecord, StoreError> {
        let mut nodes = self.nodes.write().await;
        let stored = nodes
            .get_mut(&node.id)
            .ok_or(StoreError::NodeNotFound(node.id))?;
        if stored.generation != node.generation {
            return Err(StoreError::Conflict {
                node: node.id,
                stored: stored.generation,
                caller: node.generation,
            });
        }
        stored.spec = node.spec.clone();
        stored.name = node.name.clone();
        stored.generation += 1;
        Ok(stored.clone())
    }

    async fn update_node_status(&self, node: &NodeRecord) -> Result<NodeRecord, StoreError> {
        let mut nodes = self.nodes.write().await;
        let stored = nodes
            .get_mut(&node.id)
            .ok_or(StoreError::NodeNotFound(node.id))?;
        if stored.generation != node.generation {
            return Err(StoreError::Conflict {
                node: node.id,
                stored: stored.generation,
                caller: node.generation,
            });
        }
        stored.status = node.status.clone();
        stored.generation += 1;
        Ok(stored.clone())
    }
}
