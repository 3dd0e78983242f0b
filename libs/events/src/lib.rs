//! # vmprov-events
//!
//! Provisioning event types and the notification sink interface.
//!
//! ## Design Principles
//!
//! - Events are fire-and-forget: recording one can never fail the caller,
//!   and a broken sink must never abort a reconcile.
//! - Events are keyed by node identity so an operator can follow one
//!   node's provisioning history.
//! - Events carry human-readable messages; machine-readable state lives
//!   in the node's status record, not here.
//!
//! ## Event Types
//!
//! The provisioner emits lifecycle events as a node moves through
//! provisioning: `node.creating`, `node.created`, `node.reconfigured`,
//! `node.create_failed`.

mod recorder;
mod types;

pub use recorder::{LogRecorder, MemoryRecorder, Recorder};
pub use types::*;
