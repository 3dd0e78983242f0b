//! Typed record identifiers.
//!
//! Each ID type has a unique prefix naming the record type. IDs are
//! ULID-based for sortability and uniqueness.

use crate::define_record_id;

define_record_id!(NodeId, "node");
define_record_id!(ClusterId, "cl");
define_record_id!(RequestId, "req");
