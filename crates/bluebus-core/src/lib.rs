//! Client binding for BLE peripherals managed by BlueZ.
//!
//! This crate talks to the Linux Bluetooth service over the D-Bus system bus.
//! It mirrors the service's object tree in a local cache, hands out typed
//! views of adapters, devices and GATT attributes, finds peripherals by
//! scanning, and routes characteristic value notifications to callbacks.
//!
//! # Features
//!
//! - **Object cache**: snapshot of every managed object, with strict unique lookups
//! - **Typed handles**: [`Adapter`], [`Device`], [`Service`], [`Characteristic`], [`Descriptor`]
//! - **Discovery**: scan with a timeout and cancellation, with guaranteed cleanup
//! - **Notifications**: one signal listener per session, one handler per characteristic
//! - **Testing**: [`MockBus`] stands in for the system bus
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use bluebus_core::{DiscoveryRequest, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::open().await?;
//!
//!     // Find a peripheral advertising the Battery service
//!     let request = DiscoveryRequest::new(["180f"]).timeout(Duration::from_secs(10));
//!     let device = session.discover(&request).await?;
//!     device.connect().await?;
//!     session.refresh().await?;
//!
//!     let level = session.characteristic("2a19")?.read_value().await?;
//!     println!("Battery: {}%", level.first().copied().unwrap_or_default());
//!
//!     session.close().await;
//!     Ok(())
//! }
//! ```

pub mod adapter;
pub mod bus;
pub mod cache;
pub mod config;
#[cfg(target_os = "linux")]
pub mod dbus_bus;
pub mod device;
pub mod discovery;
pub mod error;
pub mod gatt;
mod guard;
pub mod mock;
pub mod notify;
pub mod object;
pub mod session;

// Core exports
pub use adapter::Adapter;
pub use bus::{Bus, MatchRule, Signal, SignalBody, Subscription, SubscriptionId};
pub use cache::ObjectCache;
pub use config::{DEFAULT_CALL_TIMEOUT, DEFAULT_EVENT_BUFFER, DispatchPolicy, SessionConfig};
#[cfg(target_os = "linux")]
pub use dbus_bus::DbusBus;
pub use device::Device;
pub use discovery::{DiscoveryEngine, DiscoveryRequest, DiscoveryState};
pub use error::{Error, Result};
pub use gatt::{Characteristic, Descriptor, Service};
pub use mock::{MethodCall, MockBus};
pub use notify::{NotificationRegistry, NotifyHandler};
pub use object::{
    ADAPTER_INTERFACE, CHARACTERISTIC_INTERFACE, DESCRIPTOR_INTERFACE, DEVICE_INTERFACE, Handle,
    RemoteObject, SERVICE_INTERFACE,
};
pub use session::Session;

// Re-export from bluebus-types
pub use bluebus_types;
pub use bluebus_types::uuid as uuids;
pub use bluebus_types::{Address, ObjectPath, ObjectTree, PropertyMap, Value};
