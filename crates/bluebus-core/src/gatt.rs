//! GATT services, characteristics and descriptors.

use bytes::Bytes;
use tracing::{debug, info};

use bluebus_types::{ObjectPath, PropertyMap, Value};

use crate::error::{Error, Result};
use crate::object::{
    CHARACTERISTIC_INTERFACE, DESCRIPTOR_INTERFACE, Handle, RemoteObject, SERVICE_INTERFACE,
    remote_handle,
};

/// A view of an `org.bluez.GattService1` object.
#[derive(Debug, Clone)]
pub struct Service(RemoteObject);

remote_handle!(Service, SERVICE_INTERFACE);

impl Service {
    pub fn uuid(&self) -> &str {
        self.0.str_property("UUID")
    }

    /// Whether this is a primary service.
    pub fn primary(&self) -> bool {
        self.0.bool_property("Primary")
    }

    /// Path of the device exposing this service.
    pub fn device_path(&self) -> Option<&ObjectPath> {
        self.0.property("Device").and_then(Value::as_object_path)
    }
}

/// A view of an `org.bluez.GattCharacteristic1` object.
#[derive(Debug, Clone)]
pub struct Characteristic(RemoteObject);

remote_handle!(Characteristic, CHARACTERISTIC_INTERFACE);

impl Characteristic {
    pub fn uuid(&self) -> &str {
        self.0.str_property("UUID")
    }

    /// Supported operations, e.g. `read`, `write`, `notify`.
    pub fn flags(&self) -> &[String] {
        self.0.str_array_property("Flags")
    }

    /// Whether notifications were enabled when this view was taken.
    pub fn notifying(&self) -> bool {
        self.0.bool_property("Notifying")
    }

    /// Path of the service this characteristic belongs to.
    pub fn service_path(&self) -> Option<&ObjectPath> {
        self.0.property("Service").and_then(Value::as_object_path)
    }

    pub async fn read_value(&self) -> Result<Bytes> {
        read_value(&self.0).await
    }

    pub async fn write_value(&self, data: &[u8]) -> Result<()> {
        write_value(&self.0, data).await
    }

    /// Ask the peripheral to start sending value notifications.
    ///
    /// Most callers want [`crate::Session::handle_notify`], which also
    /// routes the notifications to a handler.
    pub async fn start_notify(&self) -> Result<()> {
        info!("{}: starting notifications", self.name());
        self.0.call_unit("StartNotify", Vec::new()).await
    }

    pub async fn stop_notify(&self) -> Result<()> {
        info!("{}: stopping notifications", self.name());
        self.0.call_unit("StopNotify", Vec::new()).await
    }
}

/// A view of an `org.bluez.GattDescriptor1` object.
#[derive(Debug, Clone)]
pub struct Descriptor(RemoteObject);

remote_handle!(Descriptor, DESCRIPTOR_INTERFACE);

impl Descriptor {
    pub fn uuid(&self) -> &str {
        self.0.str_property("UUID")
    }

    /// Path of the characteristic this descriptor belongs to.
    pub fn characteristic_path(&self) -> Option<&ObjectPath> {
        self.0
            .property("Characteristic")
            .and_then(Value::as_object_path)
    }

    pub async fn read_value(&self) -> Result<Bytes> {
        read_value(&self.0).await
    }

    pub async fn write_value(&self, data: &[u8]) -> Result<()> {
        write_value(&self.0, data).await
    }
}

async fn read_value(object: &RemoteObject) -> Result<Bytes> {
    let reply = object
        .call("ReadValue", vec![Value::from(PropertyMap::new())])
        .await?;
    match reply.first() {
        Some(Value::Bytes(data)) => {
            debug!("{}: read {} bytes", object.path(), data.len());
            Ok(Bytes::copy_from_slice(data))
        }
        other => Err(Error::transport(format!(
            "ReadValue on {} returned {:?} instead of a byte array",
            object.path(),
            other
        ))),
    }
}

async fn write_value(object: &RemoteObject, data: &[u8]) -> Result<()> {
    debug!("{}: writing {} bytes", object.path(), data.len());
    object
        .call_unit(
            "WriteValue",
            vec![Value::from(data.to_vec()), Value::from(PropertyMap::new())],
        )
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::mock::MockBus;

    const CHAR_PATH: &str = "/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF/service000a/char000b";

    fn characteristic(bus: &Arc<MockBus>) -> Characteristic {
        let mut props = PropertyMap::new();
        props.insert(
            "UUID".to_string(),
            Value::from("00002a19-0000-1000-8000-00805f9b34fb"),
        );
        props.insert(
            "Flags".to_string(),
            Value::from(vec!["read".to_string(), "notify".to_string()]),
        );
        props.insert("Notifying".to_string(), Value::from(false));
        Characteristic::from_object(RemoteObject::new(
            bus.clone(),
            ObjectPath::from(CHAR_PATH),
            CHARACTERISTIC_INTERFACE,
            props,
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn test_characteristic_properties() {
        let bus = Arc::new(MockBus::new());
        let ch = characteristic(&bus);
        assert_eq!(ch.uuid(), "00002a19-0000-1000-8000-00805f9b34fb");
        assert_eq!(ch.flags(), ["read", "notify"]);
        assert!(!ch.notifying());
        assert_eq!(ch.service_path(), None);
    }

    #[tokio::test]
    async fn test_read_value() {
        let bus = Arc::new(MockBus::new());
        bus.set_reply("ReadValue", vec![Value::from(vec![0x5au8])]);
        let data = characteristic(&bus).read_value().await.unwrap();
        assert_eq!(&data[..], &[0x5a]);

        let call = bus.last_call("ReadValue").unwrap();
        assert_eq!(call.args, vec![Value::from(PropertyMap::new())]);
    }

    #[tokio::test]
    async fn test_read_value_rejects_unexpected_reply() {
        let bus = Arc::new(MockBus::new());
        bus.set_reply("ReadValue", vec![Value::from("oops")]);
        let err = characteristic(&bus).read_value().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn test_write_value_sends_bytes_and_options() {
        let bus = Arc::new(MockBus::new());
        characteristic(&bus).write_value(&[1, 2, 3]).await.unwrap();

        let call = bus.last_call("WriteValue").unwrap();
        assert_eq!(
            call.args,
            vec![Value::from(vec![1u8, 2, 3]), Value::from(PropertyMap::new())]
        );
    }

    #[tokio::test]
    async fn test_descriptor_read_uses_descriptor_interface() {
        let bus = Arc::new(MockBus::new());
        bus.set_reply("ReadValue", vec![Value::from(vec![0x01u8, 0x00])]);
        let mut props = PropertyMap::new();
        props.insert(
            "UUID".to_string(),
            Value::from("00002902-0000-1000-8000-00805f9b34fb"),
        );
        let descriptor = Descriptor::from_object(RemoteObject::new(
            bus.clone(),
            ObjectPath::from(format!("{CHAR_PATH}/desc000d")),
            DESCRIPTOR_INTERFACE,
            props,
            Duration::from_secs(5),
        ));

        let data = descriptor.read_value().await.unwrap();
        assert_eq!(&data[..], &[0x01, 0x00]);
        assert_eq!(
            bus.last_call("ReadValue").unwrap().interface,
            DESCRIPTOR_INTERFACE
        );
    }
}
