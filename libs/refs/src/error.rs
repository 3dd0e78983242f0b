//! Error types for identifier parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefError {
    /// The identifier string is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The identifier has an invalid prefix.
    #[error("invalid prefix: expected '{expected}', got '{actual}'")]
    InvalidPrefix {
        expected: &'static str,
        actual: String,
    },

    /// The identifier is missing the underscore separator.
    #[error("identifier missing underscore separator")]
    MissingSeparator,

    /// The ULID portion of the identifier is invalid.
    #[error("invalid ULID: {0}")]
    InvalidUlid(String),

    /// A platform reference contained characters it must not.
    #[error("invalid platform reference: {0}")]
    InvalidReference(String),
}
