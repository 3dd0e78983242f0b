//! # vmprov-refs
//!
//! Typed identifiers and platform reference types for the vmprov platform.
//!
//! Two families of identifiers live here:
//!
//! - **Record identities** (`NodeId`, `ClusterId`, `RequestId`): stable,
//!   system-generated IDs for declarative records. Prefixed ULIDs with a
//!   canonical string form and strict parsing, e.g.
//!   `node_01HV4Z2WQXKJNM8GPQY6VBKC3D`. A node's ID doubles as the
//!   instance tag stamped onto the VM it provisions, which is how the
//!   reconciler re-finds a VM after losing all other state.
//! - **Platform references** (`InstanceRef`, `TaskRef`): opaque handles
//!   minted by the virtualization platform. We never interpret their
//!   contents; we only require them to be non-empty and free of
//!   whitespace so they survive round trips through status records.

mod error;
mod macros;
mod platform;
mod types;

pub use error::RefError;
pub use platform::{is_uuid_like, InstanceRef, TaskRef};
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
