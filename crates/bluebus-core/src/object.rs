//! Views of remote objects.
//!
//! A [`RemoteObject`] binds one `(path, interface)` pair of a cache snapshot
//! to the bus it came from. It carries a copy of that interface's
//! properties taken when the view was created and does not follow later
//! refreshes. The typed handles ([`crate::Adapter`], [`crate::Device`],
//! [`crate::Service`], [`crate::Characteristic`], [`crate::Descriptor`])
//! wrap a `RemoteObject` and implement [`Handle`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use bluebus_types::{ObjectPath, PropertyMap, Value};

use crate::bus::Bus;
use crate::error::{Error, Result};

/// Interface of the local Bluetooth controller.
pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
/// Interface of a remote peripheral.
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
/// Interface of a GATT service.
pub const SERVICE_INTERFACE: &str = "org.bluez.GattService1";
/// Interface of a GATT characteristic.
pub const CHARACTERISTIC_INTERFACE: &str = "org.bluez.GattCharacteristic1";
/// Interface of a GATT descriptor.
pub const DESCRIPTOR_INTERFACE: &str = "org.bluez.GattDescriptor1";

/// A point-in-time view of one interface of one remote object.
#[derive(Clone)]
pub struct RemoteObject {
    bus: Arc<dyn Bus>,
    path: ObjectPath,
    interface: String,
    properties: PropertyMap,
    call_timeout: Duration,
}

impl RemoteObject {
    pub(crate) fn new(
        bus: Arc<dyn Bus>,
        path: ObjectPath,
        interface: impl Into<String>,
        properties: PropertyMap,
        call_timeout: Duration,
    ) -> Self {
        Self {
            bus,
            path,
            interface: interface.into(),
            properties,
            call_timeout,
        }
    }

    pub fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Name of the interface this view is bound to.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn properties(&self) -> &PropertyMap {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Human-readable name: the `Name` property, or the path if there is none.
    pub fn name(&self) -> String {
        self.property("Name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| self.path.to_string())
    }

    /// Invoke `method` on this object's interface.
    ///
    /// Fails with [`Error::CallTimeout`] if the call does not complete within
    /// the session's call timeout. The call is not retried.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        debug!("Calling {}.{} on {}", self.interface, method, self.path);
        let call = self
            .bus
            .call_method(&self.path, &self.interface, method, args);
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::CallTimeout {
                method: format!("{}.{}", self.interface, method),
                path: self.path.clone(),
                duration: self.call_timeout,
            }),
        }
    }

    /// Invoke a method whose reply carries nothing of interest.
    pub(crate) async fn call_unit(&self, method: &str, args: Vec<Value>) -> Result<()> {
        self.call(method, args).await.map(drop)
    }

    fn required(&self, name: &str) -> &Value {
        self.properties.get(name).unwrap_or_else(|| {
            panic!(
                "{} on {} has no {} property",
                self.interface, self.path, name
            )
        })
    }

    fn mistyped(&self, name: &str, expected: &str) -> ! {
        panic!(
            "{} property {} on {} is not a {}: {:?}",
            self.interface,
            name,
            self.path,
            expected,
            self.properties.get(name)
        )
    }

    /// # Panics
    ///
    /// Panics if the property is missing or not a boolean.
    pub(crate) fn bool_property(&self, name: &str) -> bool {
        self.required(name)
            .as_bool()
            .unwrap_or_else(|| self.mistyped(name, "boolean"))
    }

    /// # Panics
    ///
    /// Panics if the property is missing or not a string.
    pub(crate) fn str_property(&self, name: &str) -> &str {
        self.required(name)
            .as_str()
            .unwrap_or_else(|| self.mistyped(name, "string"))
    }

    /// # Panics
    ///
    /// Panics if the property is missing or not a string array.
    pub(crate) fn str_array_property(&self, name: &str) -> &[String] {
        self.required(name)
            .as_str_array()
            .unwrap_or_else(|| self.mistyped(name, "string array"))
    }
}

impl fmt::Debug for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteObject")
            .field("path", &self.path)
            .field("interface", &self.interface)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for RemoteObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}]", self.path, self.interface)?;
        write_properties(f, "    ", &self.properties)
    }
}

pub(crate) fn write_properties(
    f: &mut fmt::Formatter<'_>,
    indent: &str,
    properties: &PropertyMap,
) -> fmt::Result {
    for (key, value) in properties {
        writeln!(f, "{indent}{key} {value}")?;
    }
    Ok(())
}

impl Serialize for RemoteObject {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct View<'a> {
            path: &'a ObjectPath,
            interface: &'a str,
            name: String,
            properties: &'a PropertyMap,
        }
        View {
            path: &self.path,
            interface: &self.interface,
            name: self.name(),
            properties: &self.properties,
        }
        .serialize(serializer)
    }
}

/// A typed view over one remote interface.
pub trait Handle: Sized {
    /// The interface every object of this type implements.
    const INTERFACE: &'static str;

    /// Wrap an untyped view. The caller guarantees it is bound to [`Handle::INTERFACE`].
    fn from_object(object: RemoteObject) -> Self;

    fn object(&self) -> &RemoteObject;

    fn path(&self) -> &ObjectPath {
        self.object().path()
    }

    /// Human-readable name, falling back to the path.
    fn name(&self) -> String {
        self.object().name()
    }
}

/// Implements [`Handle`], `Display` and `Serialize` for a newtype over [`RemoteObject`].
macro_rules! remote_handle {
    ($ty:ident, $iface:expr) => {
        impl $crate::object::Handle for $ty {
            const INTERFACE: &'static str = $iface;

            fn from_object(object: $crate::object::RemoteObject) -> Self {
                Self(object)
            }

            fn object(&self) -> &$crate::object::RemoteObject {
                &self.0
            }
        }

        impl ::std::fmt::Display for $ty {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::serde::Serialize for $ty {
            fn serialize<S: ::serde::Serializer>(
                &self,
                serializer: S,
            ) -> ::std::result::Result<S::Ok, S::Error> {
                self.0.serialize(serializer)
            }
        }
    };
}

pub(crate) use remote_handle;
