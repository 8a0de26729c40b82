//! Session configuration.

use std::time::Duration;

use crate::bus::SERVICE_NAME;
use crate::error::{Error, Result};

/// Default deadline for one remote method call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Default capacity of each signal subscription channel.
pub const DEFAULT_EVENT_BUFFER: usize = 64;

/// How notification handlers are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchPolicy {
    /// Spawn one task per notification. Handlers for the same
    /// characteristic may run concurrently and complete out of order.
    #[default]
    Concurrent,
    /// Run handlers for each characteristic on a dedicated worker, in
    /// delivery order. Different characteristics still run in parallel.
    SerializedPerPath,
}

/// Options for a [`crate::Session`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Deadline for each remote method call.
    pub call_timeout: Duration,
    /// Capacity of the bounded channel behind each signal subscription.
    pub event_buffer: usize,
    /// Scheduling of notification handlers.
    pub dispatch: DispatchPolicy,
    /// Bus name of the remote Bluetooth service.
    pub service: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            event_buffer: DEFAULT_EVENT_BUFFER,
            dispatch: DispatchPolicy::default(),
            service: SERVICE_NAME.to_string(),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-call deadline.
    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the subscription channel capacity.
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Set the notification dispatch policy.
    pub fn dispatch(mut self, policy: DispatchPolicy) -> Self {
        self.dispatch = policy;
        self
    }

    /// Talk to a service other than `org.bluez`.
    pub fn service(mut self, name: impl Into<String>) -> Self {
        self.service = name.into();
        self
    }

    /// Validate the options and return an error if invalid.
    ///
    /// Checks that:
    /// - `call_timeout` is > 0
    /// - `event_buffer` is > 0
    /// - `service` is not empty
    pub fn validate(&self) -> Result<()> {
        if self.call_timeout.is_zero() {
            return Err(Error::invalid_config("call_timeout must be > 0"));
        }
        if self.event_buffer == 0 {
            return Err(Error::invalid_config("event_buffer must be > 0"));
        }
        if self.service.is_empty() {
            return Err(Error::invalid_config("service must not be empty"));
        }
        Ok(())
    }
}
