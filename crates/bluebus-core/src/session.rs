//! The process-scoped client context.
//!
//! A [`Session`] owns one bus connection and everything built on it: the
//! [`ObjectCache`], the [`DiscoveryEngine`] and the [`NotificationRegistry`].
//! Create one with [`Session::open`] (system bus) or [`Session::with_bus`]
//! (any [`Bus`], e.g. [`crate::MockBus`]) and tear it down with
//! [`Session::close`].

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use bluebus_types::{Address, ObjectTree};

use crate::adapter::Adapter;
use crate::bus::Bus;
use crate::cache::ObjectCache;
use crate::config::SessionConfig;
use crate::device::Device;
use crate::discovery::{DiscoveryEngine, DiscoveryRequest, DiscoveryState};
use crate::error::Result;
use crate::gatt::{Characteristic, Descriptor, Service};
use crate::notify::NotificationRegistry;

/// A connection to the Bluetooth service and the state derived from it.
pub struct Session {
    bus: Arc<dyn Bus>,
    config: SessionConfig,
    cache: Arc<ObjectCache>,
    discovery: DiscoveryEngine,
    notifications: NotificationRegistry,
}

impl Session {
    /// Connect to BlueZ on the system bus with default settings and load
    /// the first snapshot.
    #[cfg(target_os = "linux")]
    pub async fn open() -> Result<Self> {
        Self::open_with_config(SessionConfig::default()).await
    }

    /// Connect to the configured service on the system bus and load the
    /// first snapshot.
    #[cfg(target_os = "linux")]
    pub async fn open_with_config(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let bus = crate::dbus_bus::DbusBus::system_with_service(&config.service).await?;
        Self::with_bus(Arc::new(bus), config).await
    }

    /// Build a session over an existing transport and load the first snapshot.
    pub async fn with_bus(bus: Arc<dyn Bus>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(ObjectCache::new(Arc::clone(&bus), config.call_timeout));
        cache.refresh().await?;
        let discovery =
            DiscoveryEngine::new(Arc::clone(&bus), Arc::clone(&cache), config.event_buffer);
        let notifications =
            NotificationRegistry::new(Arc::clone(&bus), config.event_buffer, config.dispatch);
        info!("Session opened with {} managed objects", cache.len());
        Ok(Self {
            bus,
            config,
            cache,
            discovery,
            notifications,
        })
    }

    /// Stop every notification this session enabled and release its bus
    /// resources. Failures are logged.
    pub async fn close(self) {
        self.notifications.shutdown().await;
        info!("Session closed");
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The transport this session talks through.
    pub fn bus(&self) -> &Arc<dyn Bus> {
        &self.bus
    }

    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Reload the object snapshot.
    pub async fn refresh(&self) -> Result<()> {
        self.cache.refresh().await
    }

    /// The current object snapshot.
    pub fn objects(&self) -> Arc<ObjectTree> {
        self.cache.snapshot()
    }

    /// The unique adapter.
    pub fn adapter(&self) -> Result<Adapter> {
        self.cache.adapter()
    }

    /// Every known peripheral.
    pub fn devices(&self) -> Vec<Device> {
        self.cache.devices()
    }

    pub fn device_by_address(&self, address: &Address) -> Result<Device> {
        self.cache.device_by_address(address)
    }

    pub fn device_by_name(&self, name: &str) -> Result<Device> {
        self.cache.device_by_name(name)
    }

    pub fn device_by_uuids<S: AsRef<str>>(&self, uuids: &[S]) -> Result<Device> {
        self.cache.device_by_uuids(uuids)
    }

    pub fn service(&self, uuid: &str) -> Result<Service> {
        self.cache.service(uuid)
    }

    pub fn characteristic(&self, uuid: &str) -> Result<Characteristic> {
        self.cache.characteristic(uuid)
    }

    pub fn descriptor(&self, uuid: &str) -> Result<Descriptor> {
        self.cache.descriptor(uuid)
    }

    /// Find a peripheral, scanning if needed. See [`DiscoveryEngine::discover`].
    pub async fn discover(&self, request: &DiscoveryRequest) -> Result<Device> {
        self.discovery.discover(request).await
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// Route value notifications of `characteristic` to `handler`.
    /// See [`NotificationRegistry::handle_notify`].
    pub async fn handle_notify<F>(&self, characteristic: &Characteristic, handler: F) -> Result<()>
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        self.notifications
            .handle_notify(characteristic, handler)
            .await
    }

    pub async fn stop_notify(&self, characteristic: &Characteristic) -> Result<()> {
        self.notifications.stop_notify(characteristic).await
    }

    pub fn notifications(&self) -> &NotificationRegistry {
        &self.notifications
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;
    use crate::mock::{GET_MANAGED_OBJECTS, MockBus};

    #[tokio::test]
    async fn test_with_bus_loads_snapshot() {
        let bus = Arc::new(MockBus::new());
        bus.add_adapter("/org/bluez/hci0", "00:1A:7D:DA:71:13");
        let session = Session::with_bus(bus.clone(), SessionConfig::default())
            .await
            .unwrap();

        assert_eq!(bus.managed_object_requests(), 1);
        assert_eq!(session.objects().len(), 1);
        assert!(session.adapter().is_ok());
        assert_eq!(session.discovery_state(), DiscoveryState::Idle);
    }

    #[tokio::test]
    async fn test_with_bus_rejects_bad_config() {
        let bus = Arc::new(MockBus::new());
        let config = SessionConfig::default().call_timeout(Duration::ZERO);
        let err = Session::with_bus(bus.clone(), config).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        assert_eq!(bus.managed_object_requests(), 0);
    }

    #[tokio::test]
    async fn test_with_bus_propagates_transport_error() {
        let bus = Arc::new(MockBus::new());
        bus.fail_method(GET_MANAGED_OBJECTS, "org.freedesktop.DBus.Error.ServiceUnknown");
        let err = Session::with_bus(bus, SessionConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_close_without_notifications_is_quiet() {
        let bus = Arc::new(MockBus::new());
        let session = Session::with_bus(bus.clone(), SessionConfig::default())
            .await
            .unwrap();
        session.close().await;
        assert!(bus.calls().is_empty());
        assert!(bus.removed_matches().is_empty());
    }
}
