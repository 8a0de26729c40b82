//! Error types for bluebus-core.
//!
//! This module defines all error types that can occur when talking to the
//! Bluetooth service over the message bus.
//!
//! # Error Classification
//!
//! | Error Type | Meaning | Retry? |
//! |------------|---------|--------|
//! | [`Error::Transport`] | Bus unreachable or call failed at the protocol level | Caller's choice |
//! | [`Error::CallTimeout`] | One method call exceeded its deadline | Usually |
//! | [`Error::NotFound`] | No cached object matched a lookup | After discovery |
//! | [`Error::Ambiguous`] | More than one cached object matched a lookup | No, narrow the lookup |
//! | [`Error::DiscoveryTimeout`] | A scan ended without a matching peripheral | Caller's choice |
//! | [`Error::Cancelled`] | The caller cancelled a scan | No |
//! | [`Error::InvalidIdentifier`] | A malformed UUID or address was supplied | No |
//! | [`Error::InvalidConfig`] | Session configuration is unusable | No |
//!
//! Nothing in this crate retries on its own. [`Error::is_retryable`] is a
//! hint for callers that implement their own policy.
//!
//! Schema mismatches with the remote service (a property missing or of the
//! wrong type) are not represented here: the typed accessors panic, because
//! they indicate a programming error rather than a runtime condition.

use std::time::Duration;

use thiserror::Error;

use bluebus_types::{ObjectPath, ParseError};

/// Errors that can occur when talking to the Bluetooth service.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The bus could not be reached, or a call failed at the protocol level.
    #[error("Bus error: {0}")]
    Transport(String),

    /// No object in the cache matched a lookup.
    #[error("Interface {interface} not found{criteria}")]
    NotFound {
        /// The interface that was searched.
        interface: String,
        /// Human-readable lookup criteria, empty or starting with a space.
        criteria: String,
    },

    /// More than one object in the cache matched a lookup.
    #[error("Found {count} instances of interface {interface}{criteria}")]
    Ambiguous {
        /// The interface that was searched.
        interface: String,
        /// Human-readable lookup criteria, empty or starting with a space.
        criteria: String,
        /// Number of matching objects.
        count: usize,
    },

    /// Discovery ran out of time without seeing a matching peripheral.
    #[error("Discovery timed out after {duration:?} looking for UUIDs {uuids:?}")]
    DiscoveryTimeout {
        /// The UUIDs the caller asked for.
        uuids: Vec<String>,
        /// The discovery budget that was exhausted.
        duration: Duration,
    },

    /// A single method call exceeded its deadline.
    #[error("Call {method} on {path} timed out after {duration:?}")]
    CallTimeout {
        /// Fully qualified method name.
        method: String,
        /// Object the method was invoked on.
        path: ObjectPath,
        /// The deadline that was exceeded.
        duration: Duration,
    },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// A malformed UUID or address was supplied.
    #[error(transparent)]
    InvalidIdentifier(#[from] ParseError),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a transport error from any displayable cause.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a not-found error for an interface and lookup criteria.
    pub fn not_found(interface: impl Into<String>, criteria: impl Into<String>) -> Self {
        Self::NotFound {
            interface: interface.into(),
            criteria: criteria.into(),
        }
    }

    /// Create an ambiguous-lookup error.
    pub fn ambiguous(
        interface: impl Into<String>,
        criteria: impl Into<String>,
        count: usize,
    ) -> Self {
        Self::Ambiguous {
            interface: interface.into(),
            criteria: criteria.into(),
            count,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Attach lookup criteria to a [`Error::NotFound`] or [`Error::Ambiguous`].
    ///
    /// Other errors are returned unchanged.
    pub fn with_criteria(self, text: impl Into<String>) -> Self {
        match self {
            Self::NotFound { interface, .. } => Self::NotFound {
                interface,
                criteria: text.into(),
            },
            Self::Ambiguous {
                interface, count, ..
            } => Self::Ambiguous {
                interface,
                criteria: text.into(),
                count,
            },
            other => other,
        }
    }

    /// Whether the failure may go away if the same operation is attempted again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::CallTimeout { .. } | Self::DiscoveryTimeout { .. }
        )
    }
}

#[cfg(target_os = "linux")]
impl From<dbus::Error> for Error {
    fn from(err: dbus::Error) -> Self {
        let name = err.name().unwrap_or("org.freedesktop.DBus.Error.Failed");
        let message = err.message().unwrap_or("no message");
        Self::Transport(format!("{name}: {message}"))
    }
}

/// Result type alias using bluebus-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
