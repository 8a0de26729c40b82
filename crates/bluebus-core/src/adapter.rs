//! The local Bluetooth controller.

use tracing::info;

use bluebus_types::{Address, ObjectPath, PropertyMap, Value};

use crate::error::Result;
use crate::object::{ADAPTER_INTERFACE, Handle, RemoteObject, remote_handle};

/// A view of an `org.bluez.Adapter1` object.
#[derive(Debug, Clone)]
pub struct Adapter(RemoteObject);

remote_handle!(Adapter, ADAPTER_INTERFACE);

impl Adapter {
    /// # Panics
    ///
    /// Panics if the adapter does not report a well-formed `Address`.
    pub fn address(&self) -> Address {
        let raw = self.0.str_property("Address");
        raw.parse()
            .unwrap_or_else(|e| panic!("adapter {} reports {e}", self.path()))
    }

    /// Whether the radio is switched on.
    pub fn powered(&self) -> bool {
        self.0.bool_property("Powered")
    }

    /// Whether a discovery session was active when this view was taken.
    pub fn discovering(&self) -> bool {
        self.0.bool_property("Discovering")
    }

    pub async fn start_discovery(&self) -> Result<()> {
        info!("{}: starting discovery", self.name());
        self.0.call_unit("StartDiscovery", Vec::new()).await
    }

    pub async fn stop_discovery(&self) -> Result<()> {
        info!("{}: stopping discovery", self.name());
        self.0.call_unit("StopDiscovery", Vec::new()).await
    }

    /// Restrict discovery to LE peripherals advertising all of `uuids`.
    pub async fn set_discovery_filter(&self, uuids: &[String]) -> Result<()> {
        info!("{}: setting discovery filter {:?}", self.name(), uuids);
        let mut filter = PropertyMap::new();
        filter.insert("Transport".to_string(), Value::from("le"));
        filter.insert("UUIDs".to_string(), Value::from(uuids.to_vec()));
        self.0
            .call_unit("SetDiscoveryFilter", vec![Value::from(filter)])
            .await
    }

    /// Forget a peripheral, including any pairing information.
    pub async fn remove_device(&self, device: &ObjectPath) -> Result<()> {
        info!("{}: removing {}", self.name(), device);
        self.0
            .call_unit("RemoveDevice", vec![Value::from(device.clone())])
            .await
    }
}
