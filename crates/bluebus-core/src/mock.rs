//! In-memory bus for testing.
//!
//! [`MockBus`] implements [`Bus`] without a bus daemon. It serves a settable
//! object tree, records every method call, match-rule change and
//! subscription, and lets tests inject signals.
//!
//! # Features
//!
//! - **Failure injection**: make a method fail with a transport error
//! - **Latency simulation**: delay a method to exercise call timeouts
//! - **Scripted signals**: emit signals when a given method is called, the
//!   way the daemon announces a peripheral after `StartDiscovery`
//!
//! Emitted signals update the object tree as the daemon would: an object
//! announced by `InterfacesAdded` is returned by the next
//! `GetManagedObjects`, and `PropertiesChanged` updates the stored
//! properties.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use bluebus_types::{InterfaceMap, ObjectPath, ObjectTree, PropertyMap, Value};

use crate::bus::{
    Bus, MatchRule, Signal, SignalBody, SignalFanout, Subscription, SubscriptionId, lock,
};
use crate::error::{Error, Result};
use crate::object::{
    ADAPTER_INTERFACE, CHARACTERISTIC_INTERFACE, DESCRIPTOR_INTERFACE, DEVICE_INTERFACE,
    SERVICE_INTERFACE,
};

/// Key under which [`Bus::get_managed_objects`] failures and latencies are registered.
pub const GET_MANAGED_OBJECTS: &str = "GetManagedObjects";

/// One method call observed by a [`MockBus`].
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub path: ObjectPath,
    pub interface: String,
    pub method: String,
    pub args: Vec<Value>,
}

/// A [`Bus`] backed by memory.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use bluebus_core::{MockBus, Session, SessionConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let bus = Arc::new(MockBus::new());
///     bus.add_adapter("/org/bluez/hci0", "00:1A:7D:DA:71:13");
///
///     let session = Session::with_bus(bus.clone(), SessionConfig::default())
///         .await
///         .unwrap();
///     let adapter = session.adapter().unwrap();
///     adapter.start_discovery().await.unwrap();
///     assert_eq!(bus.call_count("StartDiscovery"), 1);
/// }
/// ```
#[derive(Debug, Default)]
pub struct MockBus {
    objects: Mutex<ObjectTree>,
    calls: Mutex<Vec<MethodCall>>,
    replies: Mutex<HashMap<String, Vec<Value>>>,
    failures: Mutex<HashMap<String, String>>,
    latencies: Mutex<HashMap<String, Duration>>,
    scripted: Mutex<HashMap<String, Vec<Signal>>>,
    added_matches: Mutex<Vec<MatchRule>>,
    removed_matches: Mutex<Vec<MatchRule>>,
    fanout: SignalFanout,
    managed_object_requests: AtomicU32,
    subscribes: AtomicU32,
    unsubscribes: AtomicU32,
}

impl MockBus {
    /// Create an empty mock bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole object tree.
    pub fn set_objects(&self, objects: ObjectTree) {
        *lock(&self.objects) = objects;
    }

    /// Add or replace one interface of one object.
    pub fn insert_object(
        &self,
        path: impl Into<ObjectPath>,
        interface: &str,
        properties: PropertyMap,
    ) {
        lock(&self.objects)
            .entry(path.into())
            .or_default()
            .insert(interface.to_string(), properties);
    }

    /// Remove an object and all of its interfaces.
    pub fn remove_object(&self, path: &ObjectPath) {
        lock(&self.objects).remove(path);
    }

    /// Add a powered, idle adapter.
    pub fn add_adapter(&self, path: &str, address: &str) {
        self.insert_object(path, ADAPTER_INTERFACE, adapter_properties(address));
    }

    /// Add a peripheral below `adapter`.
    pub fn add_device(&self, path: &str, adapter: &str, address: &str, name: Option<&str>, uuids: &[&str]) {
        self.insert_object(
            path,
            DEVICE_INTERFACE,
            device_properties(adapter, address, name, uuids),
        );
    }

    /// Add a primary GATT service below `device`.
    pub fn add_service(&self, path: &str, device: &str, uuid: &str) {
        let mut props = PropertyMap::new();
        props.insert("UUID".to_string(), Value::from(uuid));
        props.insert("Primary".to_string(), Value::from(true));
        props.insert("Device".to_string(), Value::ObjectPath(ObjectPath::from(device)));
        self.insert_object(path, SERVICE_INTERFACE, props);
    }

    /// Add a GATT characteristic below `service`.
    pub fn add_characteristic(&self, path: &str, service: &str, uuid: &str, flags: &[&str]) {
        let mut props = PropertyMap::new();
        props.insert("UUID".to_string(), Value::from(uuid));
        props.insert("Service".to_string(), Value::ObjectPath(ObjectPath::from(service)));
        props.insert("Flags".to_string(), Value::from(strings(flags)));
        props.insert("Notifying".to_string(), Value::from(false));
        self.insert_object(path, CHARACTERISTIC_INTERFACE, props);
    }

    /// Add a GATT descriptor below `characteristic`.
    pub fn add_descriptor(&self, path: &str, characteristic: &str, uuid: &str) {
        let mut props = PropertyMap::new();
        props.insert("UUID".to_string(), Value::from(uuid));
        props.insert(
            "Characteristic".to_string(),
            Value::ObjectPath(ObjectPath::from(characteristic)),
        );
        self.insert_object(path, DESCRIPTOR_INTERFACE, props);
    }

    /// Return `values` from every later call of `method`.
    pub fn set_reply(&self, method: &str, values: Vec<Value>) {
        lock(&self.replies).insert(method.to_string(), values);
    }

    /// Make every later call of `method` fail with a transport error.
    ///
    /// Use [`GET_MANAGED_OBJECTS`] to make snapshot retrieval fail.
    pub fn fail_method(&self, method: &str, message: &str) {
        lock(&self.failures).insert(method.to_string(), message.to_string());
    }

    /// Undo [`MockBus::fail_method`].
    pub fn clear_failure(&self, method: &str) {
        lock(&self.failures).remove(method);
    }

    /// Delay every later call of `method`.
    pub fn set_latency(&self, method: &str, latency: Duration) {
        lock(&self.latencies).insert(method.to_string(), latency);
    }

    /// Emit `signal` when `method` is next called, after the call is recorded.
    pub fn emit_on_call(&self, method: &str, signal: Signal) {
        lock(&self.scripted)
            .entry(method.to_string())
            .or_default()
            .push(signal);
    }

    /// Emit a signal now.
    ///
    /// The object tree is updated first. Returns whether any active match
    /// rule selected the signal for delivery.
    pub fn emit(&self, signal: Signal) -> bool {
        self.apply(&signal);
        self.fanout.deliver(&signal)
    }

    /// Every method call so far, in order.
    pub fn calls(&self) -> Vec<MethodCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls of `method` on any object.
    pub fn call_count(&self, method: &str) -> usize {
        lock(&self.calls).iter().filter(|c| c.method == method).count()
    }

    /// Calls of `method`, in order.
    pub fn calls_to(&self, method: &str) -> Vec<MethodCall> {
        lock(&self.calls)
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// The most recent call of `method`.
    pub fn last_call(&self, method: &str) -> Option<MethodCall> {
        lock(&self.calls)
            .iter()
            .rev()
            .find(|c| c.method == method)
            .cloned()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    /// Every rule passed to [`Bus::add_match`], in order.
    pub fn added_matches(&self) -> Vec<MatchRule> {
        lock(&self.added_matches).clone()
    }

    /// Every rule passed to [`Bus::remove_match`], in order.
    pub fn removed_matches(&self) -> Vec<MatchRule> {
        lock(&self.removed_matches).clone()
    }

    /// Rules currently in effect.
    pub fn active_matches(&self) -> Vec<MatchRule> {
        self.fanout.rules()
    }

    /// Number of [`Bus::get_managed_objects`] requests so far.
    pub fn managed_object_requests(&self) -> u32 {
        self.managed_object_requests.load(Ordering::Relaxed)
    }

    pub fn subscribe_count(&self) -> u32 {
        self.subscribes.load(Ordering::Relaxed)
    }

    pub fn unsubscribe_count(&self) -> u32 {
        self.unsubscribes.load(Ordering::Relaxed)
    }

    /// Subscriptions that are still open.
    pub fn subscriber_count(&self) -> usize {
        self.fanout.subscriber_count()
    }

    async fn check_method(&self, method: &str) -> Result<()> {
        let latency = lock(&self.latencies).get(method).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match lock(&self.failures).get(method) {
            Some(message) => Err(Error::transport(message.clone())),
            None => Ok(()),
        }
    }

    fn apply(&self, signal: &Signal) {
        let mut objects = lock(&self.objects);
        match &signal.body {
            SignalBody::InterfacesAdded { object, interfaces } => {
                let entry = objects.entry(object.clone()).or_default();
                for (name, props) in interfaces {
                    entry.insert(name.clone(), props.clone());
                }
            }
            SignalBody::PropertiesChanged {
                interface,
                changed,
                invalidated,
            } => {
                if let Some(props) = objects
                    .get_mut(&signal.path)
                    .and_then(|ifaces| ifaces.get_mut(interface))
                {
                    props.extend(changed.iter().map(|(k, v)| (k.clone(), v.clone())));
                    for name in invalidated {
                        props.remove(name);
                    }
                }
            }
            SignalBody::Other => {}
        }
    }
}

#[async_trait]
impl Bus for MockBus {
    async fn get_managed_objects(&self) -> Result<ObjectTree> {
        self.managed_object_requests.fetch_add(1, Ordering::Relaxed);
        self.check_method(GET_MANAGED_OBJECTS).await?;
        Ok(lock(&self.objects).clone())
    }

    async fn call_method(
        &self,
        path: &ObjectPath,
        interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        lock(&self.calls).push(MethodCall {
            path: path.clone(),
            interface: interface.to_string(),
            method: method.to_string(),
            args,
        });
        self.check_method(method).await?;

        let scripted = lock(&self.scripted).remove(method).unwrap_or_default();
        for signal in scripted {
            debug!("Emitting {} after {}", signal.name(), method);
            self.emit(signal);
        }

        Ok(lock(&self.replies).get(method).cloned().unwrap_or_default())
    }

    async fn subscribe(&self, capacity: usize) -> Result<Subscription> {
        self.subscribes.fetch_add(1, Ordering::Relaxed);
        Ok(self.fanout.subscribe(capacity))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.unsubscribes.fetch_add(1, Ordering::Relaxed);
        self.fanout.unsubscribe(id);
        Ok(())
    }

    async fn add_match(&self, rule: &MatchRule) -> Result<()> {
        lock(&self.added_matches).push(rule.clone());
        self.check_method("AddMatch").await?;
        self.fanout.add_rule(rule);
        Ok(())
    }

    async fn remove_match(&self, rule: &MatchRule) -> Result<()> {
        lock(&self.removed_matches).push(rule.clone());
        self.fanout.remove_rule(rule);
        self.check_method("RemoveMatch").await
    }
}

/// Properties of a powered, idle adapter.
pub fn adapter_properties(address: &str) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("Address".to_string(), Value::from(address));
    props.insert("Powered".to_string(), Value::from(true));
    props.insert("Discovering".to_string(), Value::from(false));
    props
}

/// Properties of a disconnected, unpaired peripheral.
pub fn device_properties(
    adapter: &str,
    address: &str,
    name: Option<&str>,
    uuids: &[&str],
) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert("Adapter".to_string(), Value::ObjectPath(ObjectPath::from(adapter)));
    props.insert("Address".to_string(), Value::from(address));
    props.insert("AddressType".to_string(), Value::from("random"));
    props.insert("UUIDs".to_string(), Value::from(strings(uuids)));
    props.insert("Connected".to_string(), Value::from(false));
    props.insert("Paired".to_string(), Value::from(false));
    if let Some(name) = name {
        props.insert("Name".to_string(), Value::from(name));
    }
    props
}

/// An `InterfacesAdded` signal announcing a peripheral.
pub fn device_added(path: &str, properties: PropertyMap) -> Signal {
    let mut interfaces = InterfaceMap::new();
    interfaces.insert(DEVICE_INTERFACE.to_string(), properties);
    Signal::interfaces_added(ObjectPath::from(path), interfaces)
}

/// A `PropertiesChanged` signal carrying a new characteristic value.
pub fn value_changed(path: &str, value: &[u8]) -> Signal {
    let mut changed = PropertyMap::new();
    changed.insert("Value".to_string(), Value::from(value.to_vec()));
    Signal::properties_changed(ObjectPath::from(path), CHARACTERISTIC_INTERFACE, changed)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_calls_and_replies() {
        let bus = MockBus::new();
        bus.set_reply("ReadValue", vec![Value::from(vec![7u8])]);
        let path = ObjectPath::from("/org/bluez/hci0/dev_1/service1/char1");

        let reply = bus
            .call_method(&path, CHARACTERISTIC_INTERFACE, "ReadValue", Vec::new())
            .await
            .unwrap();

        assert_eq!(reply, vec![Value::from(vec![7u8])]);
        assert_eq!(bus.call_count("ReadValue"), 1);
        assert_eq!(bus.last_call("ReadValue").unwrap().path, path);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let bus = MockBus::new();
        bus.fail_method(GET_MANAGED_OBJECTS, "org.freedesktop.DBus.Error.ServiceUnknown");
        assert!(matches!(
            bus.get_managed_objects().await,
            Err(Error::Transport(_))
        ));

        bus.clear_failure(GET_MANAGED_OBJECTS);
        assert!(bus.get_managed_objects().await.is_ok());
        assert_eq!(bus.managed_object_requests(), 2);
    }

    #[tokio::test]
    async fn test_emit_requires_match_rule() {
        let bus = MockBus::new();
        let mut sub = bus.subscribe(4).await.unwrap();
        let signal = device_added(
            "/org/bluez/hci0/dev_1",
            device_properties("/org/bluez/hci0", "AA:BB:CC:DD:EE:FF", None, &[]),
        );

        assert!(!bus.emit(signal.clone()));
        bus.add_match(&MatchRule::interfaces_added()).await.unwrap();
        assert!(bus.emit(signal.clone()));

        assert_eq!(sub.receiver.recv().await, Some(signal));
    }

    #[tokio::test]
    async fn test_emit_updates_object_tree() {
        let bus = MockBus::new();
        bus.emit(device_added(
            "/org/bluez/hci0/dev_1",
            device_properties("/org/bluez/hci0", "AA:BB:CC:DD:EE:FF", Some("Sensor"), &[]),
        ));

        let mut changed = PropertyMap::new();
        changed.insert("Connected".to_string(), Value::from(true));
        bus.emit(Signal::properties_changed(
            ObjectPath::from("/org/bluez/hci0/dev_1"),
            DEVICE_INTERFACE,
            changed,
        ));

        let objects = bus.get_managed_objects().await.unwrap();
        let device = &objects[&ObjectPath::from("/org/bluez/hci0/dev_1")][DEVICE_INTERFACE];
        assert_eq!(device["Name"], Value::from("Sensor"));
        assert_eq!(device["Connected"], Value::from(true));
    }

    #[tokio::test]
    async fn test_scripted_signal_fires_once() {
        let bus = MockBus::new();
        bus.add_match(&MatchRule::interfaces_added()).await.unwrap();
        let mut sub = bus.subscribe(4).await.unwrap();
        bus.emit_on_call(
            "StartDiscovery",
            device_added("/org/bluez/hci0/dev_1", PropertyMap::new()),
        );

        let adapter = ObjectPath::from("/org/bluez/hci0");
        for _ in 0..2 {
            bus.call_method(&adapter, ADAPTER_INTERFACE, "StartDiscovery", Vec::new())
                .await
                .unwrap();
        }

        assert!(sub.receiver.try_recv().is_ok());
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tracks_match_rules_and_subscriptions() {
        let bus = MockBus::new();
        let rule = MatchRule::properties_changed();
        bus.add_match(&rule).await.unwrap();
        bus.remove_match(&rule).await.unwrap();
        let sub = bus.subscribe(1).await.unwrap();
        bus.unsubscribe(sub.id).await.unwrap();

        assert_eq!(bus.added_matches(), vec![rule.clone()]);
        assert_eq!(bus.removed_matches(), vec![rule]);
        assert!(bus.active_matches().is_empty());
        assert_eq!(bus.subscribe_count(), 1);
        assert_eq!(bus.unsubscribe_count(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
