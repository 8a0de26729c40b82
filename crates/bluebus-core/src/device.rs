//! Remote peripherals.

use tracing::info;

use bluebus_types::{Address, ObjectPath};

use crate::error::Result;
use crate::object::{DEVICE_INTERFACE, Handle, RemoteObject, remote_handle};

/// A view of an `org.bluez.Device1` object.
#[derive(Debug, Clone)]
pub struct Device(RemoteObject);

remote_handle!(Device, DEVICE_INTERFACE);

impl Device {
    /// # Panics
    ///
    /// Panics if the device does not report a well-formed `Address`.
    pub fn address(&self) -> Address {
        let raw = self.0.str_property("Address");
        raw.parse()
            .unwrap_or_else(|e| panic!("device {} reports {e}", self.path()))
    }

    /// `public` or `random`.
    pub fn address_type(&self) -> &str {
        self.0.str_property("AddressType")
    }

    /// Advertised service UUIDs, as reported (128-bit form).
    pub fn uuids(&self) -> &[String] {
        self.0.str_array_property("UUIDs")
    }

    /// Like [`Device::uuids`], but empty when the property is absent.
    ///
    /// BlueZ omits `UUIDs` for peripherals that have not advertised any.
    pub(crate) fn advertised_uuids(&self) -> &[String] {
        self.0
            .property("UUIDs")
            .and_then(|v| v.as_str_array())
            .unwrap_or_default()
    }

    pub fn connected(&self) -> bool {
        self.0.bool_property("Connected")
    }

    pub fn paired(&self) -> bool {
        self.0.bool_property("Paired")
    }

    /// Signal strength of the last advertisement, if one was received
    /// during the current discovery session.
    pub fn rssi(&self) -> Option<i16> {
        self.0
            .property("RSSI")
            .and_then(|v| v.as_i64())
            .and_then(|v| i16::try_from(v).ok())
    }

    /// The adapter this device was seen by.
    pub fn adapter_path(&self) -> Option<&ObjectPath> {
        self.0.property("Adapter").and_then(|v| v.as_object_path())
    }

    pub async fn connect(&self) -> Result<()> {
        info!("{}: connecting", self.name());
        self.0.call_unit("Connect", Vec::new()).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        info!("{}: disconnecting", self.name());
        self.0.call_unit("Disconnect", Vec::new()).await
    }

    pub async fn pair(&self) -> Result<()> {
        info!("{}: pairing", self.name());
        self.0.call_unit("Pair", Vec::new()).await
    }
}
