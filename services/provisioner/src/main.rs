//! vmprov Provisioner Service
//!
//! Drives declarative node records through their VM provisioning
//! lifecycle with level-triggered reconciliation.
//!
//! ## Architecture
//!
//! - **Worker**: sweeps due nodes on a fixed interval
//! - **Provisioner**: decides and performs the single next action per node
//! - **Platform / Store / Payloads**: external collaborators behind
//!   traits (mock-backed in this binary until transports land)

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vmprov_events::LogRecorder;
use vmprov_provisioner::bootstrap::FixedPayloads;
use vmprov_provisioner::config::Config;
use vmprov_provisioner::model::{ApiStatus, ClusterRecord, ClusterSpec};
use vmprov_provisioner::platform::{MockPlatform, TemplateFixture};
use vmprov_provisioner::store::InMemoryStore;
use vmprov_provisioner::worker::ReconcileWorker;
use vmprov_provisioner::{Provisioner, ProvisionerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting vmprov provisioner");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        server = %config.server,
        reconcile_interval_secs = config.reconcile_interval.as_secs(),
        "Configuration loaded"
    );

    // Create the platform (mock for now)
    let platform = Arc::new(MockPlatform::new());
    platform.register_vm(TemplateFixture::named("base-template"));
    platform.add_network("VM Network");

    // Create the record store (in-memory for now) with the cluster
    // context node records will reconcile against
    let store = Arc::new(InMemoryStore::new());
    let cluster = store
        .insert_cluster(ClusterRecord::new(
            "default",
            ClusterSpec {
                server: config.server.clone(),
                username: config.username.clone(),
                password: config.password.clone(),
                insecure: config.insecure,
                default_network: Some("VM Network".to_string()),
                api_status: ApiStatus::Ready,
            },
        ))
        .await;

    let provisioner = Arc::new(Provisioner::new(
        platform,
        store.clone(),
        Arc::new(FixedPayloads::new()),
        Arc::new(LogRecorder),
        ProvisionerConfig {
            task_poll_interval: config.task_poll_interval,
        },
    ));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start the reconcile loop
    let mut worker = ReconcileWorker::new(
        provisioner,
        store,
        cluster.id,
        config.reconcile_interval,
    );
    let worker_handle = tokio::spawn(async move {
        worker.run(shutdown_rx).await;
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
    worker_handle.await?;

    info!("Provisioner stopped");
    Ok(())
}
