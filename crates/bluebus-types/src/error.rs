//! Error types for parsing in bluebus-types.

use thiserror::Error;

/// Errors that can occur when parsing identifiers and addresses.
///
/// This error type is transport-agnostic and does not include
/// bus-level errors (those belong in bluebus-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The string is not a 16-bit, 32-bit or 128-bit identifier in canonical form.
    #[error("Invalid UUID: {0:?}")]
    InvalidUuid(String),

    /// The string is not a colon-separated MAC address.
    #[error("Invalid Bluetooth address: {0:?}")]
    InvalidAddress(String),

    /// A property value had an unexpected shape.
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using bluebus-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
