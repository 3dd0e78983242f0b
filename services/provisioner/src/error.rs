//! Error taxonomy and the reconcile outcome type.

use std::time::Duration;

use thiserror::Error;
use vmprov_refs::TaskRef;

use crate::bootstrap::PayloadError;
use crate::platform::PlatformError;
use crate::store::StoreError;

/// Outcome of a reconcile invocation that did not fail.
///
/// `RetryAfter` is a value, not an error: it tells the external scheduler
/// to re-invoke after the given delay (an operation is still running, or
/// a dependency is not ready yet). It is never logged as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing left to do this invocation.
    Done,

    /// Re-invoke after the given delay.
    RetryAfter(Duration),
}

impl Reconciliation {
    pub fn is_done(&self) -> bool {
        matches!(self, Reconciliation::Done)
    }

    /// The requested delay, if this outcome asks for a retry.
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Reconciliation::Done => None,
            Reconciliation::RetryAfter(d) => Some(*d),
        }
    }
}

/// Errors surfaced by a reconcile invocation.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The declared configuration is wrong and an operator must fix it;
    /// retrying without a spec change cannot succeed.
    #[error("configuration error: {0}")]
    Config(String),

    /// Platform transport or query failure; safe to retry.
    #[error(transparent)]
    Platform(#[from] PlatformError),

    /// Record store failure, including update conflicts; safe to retry.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Bootstrap payload generation failed for a non-retryable reason.
    #[error("bootstrap payload error: {0}")]
    Payload(String),

    /// The platform reported an operation state this code does not know.
    /// The task reference is left untouched so the situation can be
    /// investigated rather than silently dropped.
    #[error("unknown state '{state}' for task {task}")]
    UnknownTaskState { task: TaskRef, state: String },
}

impl From<PayloadError> for ProvisionError {
    fn from(err: PayloadError) -> Self {
        match err {
            // Callers intercept NotReady and turn it into a retry signal
            // before conversion; this arm only fires if one forgets.
            PayloadError::NotReady { retry_after } => ProvisionError::Payload(format!(
                "payloads not ready, retry in {retry_after:?}"
            )),
            PayloadError::Config(msg) => ProvisionError::Config(msg),
            PayloadError::Render(msg) => ProvisionError::Payload(msg),
        }
    }
}
