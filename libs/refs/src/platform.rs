//! Opaque references minted by the virtualization platform.
//!
//! Unlike record IDs, these values are not ours to generate or inspect.
//! The platform hands them out (a managed-object value for a VM, a task
//! value for an asynchronous operation) and we carry them through status
//! records verbatim. Validation is limited to what a reference must
//! satisfy to survive persistence: non-empty, no whitespace.

use serde::{Deserialize, Serialize};

use crate::RefError;

fn validate_opaque(s: &str) -> Result<(), RefError> {
    if s.is_empty() {
        return Err(RefError::Empty);
    }
    if s.chars().any(char::is_whitespace) {
        return Err(RefError::InvalidReference(format!(
            "reference '{s}' contains whitespace"
        )));
    }
    Ok(())
}

/// Reference to a concrete VM on the platform.
///
/// Set at most once per node lifetime under normal operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InstanceRef(String);

impl<'de> Deserialize<'de> for InstanceRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl InstanceRef {
    /// Wraps a platform-provided VM reference.
    pub fn new(value: impl Into<String>) -> Result<Self, RefError> {
        let value = value.into();
        validate_opaque(&value)?;
        Ok(Self(value))
    }

    /// The raw reference value as the platform knows it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one outstanding asynchronous platform operation.
///
/// At most one live task reference is associated with a node at any time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TaskRef(String);

impl<'de> Deserialize<'de> for TaskRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl TaskRef {
    /// Wraps a platform-provided task reference.
    pub fn new(value: impl Into<String>) -> Result<Self, RefError> {
        let value = value.into();
        validate_opaque(&value)?;
        Ok(Self(value))
    }

    /// The raw reference value as the platform knows it.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns true if `s` is syntactically a platform-native unique ID.
///
/// Template identifiers may be supplied either as a friendly name or as
/// the platform's UUID form; callers use this to pick the lookup mode.
pub fn is_uuid_like(s: &str) -> bool {
    uuid::Uuid::parse_str(s).is_ok()
}
