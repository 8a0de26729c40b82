//! Bounded search for peripherals advertising given services.
//!
//! [`DiscoveryEngine::discover`] first looks for a matching peripheral in the
//! current snapshot and returns it without scanning if there is one. Otherwise
//! it puts the adapter into discovery mode and waits for an `InterfacesAdded`
//! signal announcing a matching peripheral, for the request's timeout to
//! expire, or for the caller to cancel, whichever comes first.
//!
//! ```text
//! Idle ──▶ Scanning ──▶ Matched ──┐
//!              │──────▶ TimedOut ─┼──▶ Idle
//!              └──────▶ Failed ───┘
//! ```
//!
//! Whatever the exit path, the scan stops discovery mode, removes its match
//! rule and drops its subscription before returning. On a match the cache
//! is refreshed and the final [`Device`] comes from the fresh snapshot, not
//! from the signal payload.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bluebus_types::{Address, ParseError, Value, uuids};

use crate::adapter::Adapter;
use crate::bus::{Bus, MatchRule, Signal, SignalBody};
use crate::cache::ObjectCache;
use crate::device::Device;
use crate::error::{Error, Result};
use crate::guard::ScanGuard;
use crate::object::{DEVICE_INTERFACE, Handle};

/// What to look for and for how long.
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    uuids: Vec<String>,
    address: Option<Address>,
    timeout: Duration,
    cancel: Option<CancellationToken>,
    filter: bool,
}

impl Default for DiscoveryRequest {
    fn default() -> Self {
        Self {
            uuids: Vec::new(),
            address: None,
            timeout: Duration::ZERO,
            cancel: None,
            filter: true,
        }
    }
}

impl DiscoveryRequest {
    /// Look for a peripheral advertising all of `uuids`, with no time limit.
    pub fn new<I, S>(uuids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uuids: uuids.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Also require the peripheral to have this address.
    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Give up after `timeout`. Zero means wait indefinitely.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort the scan with [`Error::Cancelled`] when `token` is cancelled.
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Whether to ask the adapter to filter advertisements itself.
    ///
    /// Matching is always repeated on this side, so disabling the filter
    /// only costs extra signals. Some adapters reject or mishandle filters.
    pub fn filter(mut self, enabled: bool) -> Self {
        self.filter = enabled;
        self
    }

    pub fn uuids(&self) -> &[String] {
        &self.uuids
    }

    pub fn address_filter(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn timeout_duration(&self) -> Duration {
        self.timeout
    }

    /// Reject malformed UUIDs before any bus traffic.
    pub fn validate(&self) -> Result<()> {
        match self.uuids.iter().find(|u| !uuids::is_valid(u)) {
            Some(bad) => Err(ParseError::InvalidUuid(bad.clone()).into()),
            None => Ok(()),
        }
    }

    /// Whether an `InterfacesAdded` signal announces a peripheral this
    /// request is looking for.
    pub fn matches(&self, signal: &Signal) -> bool {
        let SignalBody::InterfacesAdded { object, interfaces } = &signal.body else {
            debug!("Unexpected signal {} during discovery", signal.name());
            return false;
        };
        let Some(props) = interfaces.get(DEVICE_INTERFACE) else {
            debug!("{}: not a device", object);
            return false;
        };

        let advertised = props
            .get("UUIDs")
            .and_then(Value::as_str_array)
            .unwrap_or_default();
        let address = props.get("Address").and_then(Value::as_str);
        let name = props.get("Name").and_then(Value::as_str);
        debug!(
            "{}: discovered {} ({:?}) advertising {:?}",
            object,
            name.unwrap_or("unnamed"),
            address,
            advertised
        );

        if !uuids::uuids_include(advertised, &self.uuids) {
            return false;
        }
        match &self.address {
            Some(wanted) => address
                .and_then(|a| a.parse::<Address>().ok())
                .is_some_and(|a| a == *wanted),
            None => true,
        }
    }

    fn lookup(&self, cache: &ObjectCache) -> Result<Device> {
        match &self.address {
            Some(address) => cache.device_by_address(address),
            None => cache.device_by_uuids(&self.uuids),
        }
    }
}

/// Where the engine is in its scan cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// No scan in progress.
    Idle,
    /// Discovery mode is on and signals are being matched.
    Scanning,
    /// A matching peripheral was announced; cleanup and refresh follow.
    Matched,
    /// The timeout expired; cleanup follows.
    TimedOut,
    /// The scan failed or was cancelled; cleanup follows.
    Failed,
}

/// Runs discovery scans for a session, one at a time.
pub struct DiscoveryEngine {
    bus: Arc<dyn Bus>,
    cache: Arc<ObjectCache>,
    event_buffer: usize,
    state: watch::Sender<DiscoveryState>,
    scan_lock: Mutex<()>,
}

impl DiscoveryEngine {
    pub fn new(bus: Arc<dyn Bus>, cache: Arc<ObjectCache>, event_buffer: usize) -> Self {
        let (state, _) = watch::channel(DiscoveryState::Idle);
        Self {
            bus,
            cache,
            event_buffer,
            state,
            scan_lock: Mutex::new(()),
        }
    }

    /// The current state.
    pub fn state(&self) -> DiscoveryState {
        *self.state.borrow()
    }

    /// Observe state transitions.
    pub fn watch_state(&self) -> watch::Receiver<DiscoveryState> {
        self.state.subscribe()
    }

    /// Find a peripheral matching `request`, scanning if it is not already known.
    ///
    /// Every exit path releases the scan before returning: discovery is
    /// stopped, the match rule removed and the subscription closed. A step
    /// that never succeeded is not undone: a failed `StartDiscovery` gets no
    /// `StopDiscovery`, and a failed `AddMatch` gets no `RemoveMatch`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIdentifier`] if a requested UUID is malformed
    /// - [`Error::Ambiguous`] if several known peripherals already match
    /// - [`Error::NotFound`] if there is no adapter, or the matching
    ///   peripheral is gone from the refreshed snapshot
    /// - [`Error::DiscoveryTimeout`] if nothing matched within the timeout
    /// - [`Error::Cancelled`] if the request's token was cancelled
    /// - [`Error::Transport`] / [`Error::CallTimeout`] on bus failures
    pub async fn discover(&self, request: &DiscoveryRequest) -> Result<Device> {
        request.validate()?;
        let _scan = self.scan_lock.lock().await;

        match request.lookup(&self.cache) {
            Ok(device) => {
                info!("{}: already discovered", device.name());
                return Ok(device);
            }
            Err(Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }

        let adapter = self.cache.adapter()?;
        let _idle = ResetOnDrop(&self.state);
        self.state.send_replace(DiscoveryState::Scanning);
        let outcome = self.scan(&adapter, request).await;
        self.state.send_replace(match &outcome {
            Ok(()) => DiscoveryState::Matched,
            Err(Error::DiscoveryTimeout { .. }) => DiscoveryState::TimedOut,
            Err(_) => DiscoveryState::Failed,
        });

        outcome?;
        self.cache.refresh().await?;
        request.lookup(&self.cache)
    }

    async fn scan(&self, adapter: &Adapter, request: &DiscoveryRequest) -> Result<()> {
        let mut subscription = self.bus.subscribe(self.event_buffer).await?;
        let mut guard = ScanGuard::new(Arc::clone(&self.bus), subscription.id);

        let outcome: Result<()> = async {
            let rule = MatchRule::interfaces_added();
            self.bus.add_match(&rule).await?;
            guard.matching(rule);

            if request.filter
                && let Err(e) = adapter.set_discovery_filter(&request.uuids).await
            {
                warn!("{}: ignoring discovery filter failure: {}", adapter.name(), e);
            }

            adapter.start_discovery().await?;
            guard.discovering(adapter.clone());

            let deadline = async {
                if request.timeout.is_zero() {
                    pending::<()>().await
                } else {
                    tokio::time::sleep(request.timeout).await
                }
            };
            tokio::pin!(deadline);
            let cancel = request.cancel.clone().unwrap_or_default();

            loop {
                tokio::select! {
                    signal = subscription.receiver.recv() => match signal {
                        Some(signal) if request.matches(&signal) => {
                            info!("{}: discovery finished", adapter.name());
                            break Ok(());
                        }
                        Some(_) => {}
                        None => break Err(Error::transport("signal subscription closed during discovery")),
                    },
                    () = &mut deadline => {
                        info!("{}: discovery timed out after {:?}", adapter.name(), request.timeout);
                        break Err(Error::DiscoveryTimeout {
                            uuids: request.uuids.clone(),
                            duration: request.timeout,
                        });
                    }
                    () = cancel.cancelled() => {
                        info!("{}: discovery cancelled", adapter.name());
                        break Err(Error::Cancelled);
                    }
                }
            }
        }
        .await;

        guard.release().await;
        outcome
    }
}

/// Puts the engine back to idle however `discover` exits, including when
/// its future is dropped.
struct ResetOnDrop<'a>(&'a watch::Sender<DiscoveryState>);

impl Drop for ResetOnDrop<'_> {
    fn drop(&mut self) {
        self.0.send_replace(DiscoveryState::Idle);
    }
}

impl std::fmt::Debug for DiscoveryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryEngine")
            .field("state", &self.state())
            .field("event_buffer", &self.event_buffer)
            .finish_non_exhaustive()
    }
}
