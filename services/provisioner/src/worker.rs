//! Periodic reconcile worker.
//!
//! Drives every node in the store through one reconcile per tick. The
//! provisioner never sleeps internally; when it asks to be revisited the
//! worker records the deadline and skips the node until it is due.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info};
use vmprov_refs::{ClusterId, NodeId};

use crate::error::Reconciliation;
use crate::provision::Provisioner;
use crate::store::RecordStore;

/// Worker that runs the reconcile loop for one cluster's nodes.
pub struct ReconcileWorker {
    provisioner: Arc<Provisioner>,
    store: Arc<dyn RecordStore>,
    cluster_id: ClusterId,
    interval: Duration,

    /// Nodes that asked to be revisited, with their deadlines.
    not_before: HashMap<NodeId, Instant>,
}

impl ReconcileWorker {
    pub fn new(
        provisioner: Arc<Provisioner>,
        store: Arc<dyn RecordStore>,
        cluster_id: ClusterId,
        interval: Duration,
    ) -> Self {
        Self {
            provisioner,
            store,
            cluster_id,
            interval,
            not_before: HashMap::new(),
        }
    }

    /// Run the reconcile loop until shutdown is signaled.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Starting reconcile worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        // Don't immediately tick on startup - wait for first interval
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Reconcile worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run one reconcile pass over every due node.
    async fn sweep(&mut self) {
        let cluster = match self.store.get_cluster(self.cluster_id).await {
            Ok(cluster) => cluster,
            Err(e) => {
                error!(cluster_id = %self.cluster_id, error = %e, "Failed to load cluster record");
                return;
            }
        };
        let nodes = match self.store.list_nodes().await {
            Ok(nodes) => nodes,
            Err(e) => {
                error!(error = %e, "Failed to list nodes");
                return;
            }
        };

        let now = Instant::now();
        for node in nodes {
            if self.not_before.get(&node.id).is_some_and(|due| *due > now) {
                continue;
            }
            self.not_before.remove(&node.id);

            match self.provisioner.reconcile(&cluster, &node).await {
                Ok(Reconciliation::Done) => {}
                Ok(Reconciliation::RetryAfter(delay)) => {
                    debug!(
                        node_id = %node.id,
                        delay_secs = delay.as_secs(),
                        "Node asked to be revisited"
                    );
                    self.not_before.insert(node.id, now + delay);
                }
                Err(e) => {
                    error!(node_id = %node.id, error = %e, "Reconcile failed");
                }
            }
        }
    }
}
