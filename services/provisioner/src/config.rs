//! Configuration for the provisioner service.

use std::time::Duration;

use anyhow::Result;

/// Provisioner service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Platform server address.
    pub server: String,

    pub username: String,
    pub password: String,

    /// Skip server certificate verification.
    pub insecure: bool,

    /// Interval between reconcile sweeps.
    pub reconcile_interval: Duration,

    /// Delay returned while a tracked operation is still in progress.
    pub task_poll_interval: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let server = std::env::var("VMPROV_SERVER")
            .unwrap_or_else(|_| "https://vcenter.local".to_string());

        let username = std::env::var("VMPROV_USERNAME")
            .unwrap_or_else(|_| "administrator@vsphere.local".to_string());

        let password = std::env::var("VMPROV_PASSWORD").unwrap_or_default();

        let insecure = std::env::var("VMPROV_INSECURE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(false);

        let reconcile_interval = std::env::var("VMPROV_RECONCILE_INTERVAL")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(30));

        let task_poll_interval = std::env::var("VMPROV_TASK_POLL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(5));

        let log_level = std::env::var("VMPROV_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            server,
            username,
            password,
            insecure,
            reconcile_interval,
            task_poll_interval,
            log_level,
        })
    }
}
