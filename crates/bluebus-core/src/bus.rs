//! Message-bus transport abstraction.
//!
//! Everything the rest of the crate needs from the inter-process bus is
//! expressed by the [`Bus`] trait: bulk object retrieval, method calls,
//! signal subscription and match-rule management. [`crate::DbusBus`] is the
//! system-bus implementation on Linux; [`crate::MockBus`] is an in-memory
//! implementation for tests.
//!
//! Signal delivery follows the bus-daemon model: a signal reaches this
//! process only if some match rule added with [`Bus::add_match`] selects it,
//! and every live [`Subscription`] then receives a copy. Consumers filter by
//! [`Signal::body`] themselves.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use bluebus_types::{InterfaceMap, ObjectPath, ObjectTree, PropertyMap, Value};

use crate::error::Result;

/// Well-known bus name of the BlueZ daemon.
pub const SERVICE_NAME: &str = "org.bluez";

/// Standard interface for enumerating managed objects.
pub const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";

/// Standard interface for property access and change signals.
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Signal emitted by the object manager when an object appears.
pub const INTERFACES_ADDED: &str = "InterfacesAdded";

/// Signal emitted when properties of an object change.
pub const PROPERTIES_CHANGED: &str = "PropertiesChanged";

/// A bus-level signal filter.
///
/// Rendered with [`fmt::Display`] into the textual match-rule syntax the bus
/// daemon understands, e.g.
/// `type='signal',interface='org.freedesktop.DBus.Properties',member='PropertiesChanged'`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchRule {
    interface: String,
    member: Option<String>,
    path: Option<ObjectPath>,
}

impl MatchRule {
    /// Match every signal on `interface`.
    pub fn signal(interface: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            member: None,
            path: None,
        }
    }

    /// Restrict the rule to one signal name.
    #[must_use]
    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Restrict the rule to signals emitted by one object.
    #[must_use]
    pub fn path(mut self, path: ObjectPath) -> Self {
        self.path = Some(path);
        self
    }

    /// Object-added signals from the object manager.
    pub fn interfaces_added() -> Self {
        Self::signal(OBJECT_MANAGER_INTERFACE).member(INTERFACES_ADDED)
    }

    /// Property-change signals from any object.
    pub fn properties_changed() -> Self {
        Self::signal(PROPERTIES_INTERFACE).member(PROPERTIES_CHANGED)
    }

    pub fn interface_name(&self) -> &str {
        &self.interface
    }

    pub fn member_name(&self) -> Option<&str> {
        self.member.as_deref()
    }

    pub fn object_path(&self) -> Option<&ObjectPath> {
        self.path.as_ref()
    }

    /// Whether a signal would be selected by this rule.
    pub fn matches(&self, signal: &Signal) -> bool {
        signal.interface == self.interface
            && self.member.as_ref().is_none_or(|m| *m == signal.member)
            && self.path.as_ref().is_none_or(|p| *p == signal.path)
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type='signal',interface='{}'", self.interface)?;
        if let Some(member) = &self.member {
            write!(f, ",member='{member}'")?;
        }
        if let Some(path) = &self.path {
            write!(f, ",path='{path}'")?;
        }
        Ok(())
    }
}

/// Decoded payload of a [`Signal`].
#[derive(Debug, Clone, PartialEq)]
pub enum SignalBody {
    /// An object was added to the managed tree.
    InterfacesAdded {
        object: ObjectPath,
        interfaces: InterfaceMap,
    },
    /// Properties of the emitting object changed.
    PropertiesChanged {
        interface: String,
        changed: PropertyMap,
        invalidated: Vec<String>,
    },
    /// Any other signal; only its name is kept.
    Other,
}

/// A signal received from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Object that emitted the signal.
    pub path: ObjectPath,
    /// Interface the signal belongs to.
    pub interface: String,
    /// Signal name within the interface.
    pub member: String,
    pub body: SignalBody,
}

impl Signal {
    /// Build an object-added signal as emitted by the object manager at `/`.
    pub fn interfaces_added(object: ObjectPath, interfaces: InterfaceMap) -> Self {
        Self {
            path: ObjectPath::from("/"),
            interface: OBJECT_MANAGER_INTERFACE.to_string(),
            member: INTERFACES_ADDED.to_string(),
            body: SignalBody::InterfacesAdded { object, interfaces },
        }
    }

    /// Build a property-change signal emitted by `path`.
    pub fn properties_changed(
        path: ObjectPath,
        interface: impl Into<String>,
        changed: PropertyMap,
    ) -> Self {
        Self {
            path,
            interface: PROPERTIES_INTERFACE.to_string(),
            member: PROPERTIES_CHANGED.to_string(),
            body: SignalBody::PropertiesChanged {
                interface: interface.into(),
                changed,
                invalidated: Vec::new(),
            },
        }
    }

    /// Fully qualified signal name, e.g. `org.freedesktop.DBus.ObjectManager.InterfacesAdded`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.interface, self.member)
    }
}

/// Identifies a [`Subscription`] for [`Bus::unsubscribe`].
pub type SubscriptionId = u64;

/// A bounded stream of signals delivered to this process.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub receiver: mpsc::Receiver<Signal>,
}

/// The operations the client needs from the message bus.
///
/// Implementations must tolerate concurrent use: one connection is shared by
/// every call, subscription and match-rule operation of a session.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Fetch every managed object with all interfaces and properties.
    async fn get_managed_objects(&self) -> Result<ObjectTree>;

    /// Invoke `interface.method` on the object at `path`.
    ///
    /// Per-call deadlines are enforced by the caller; implementations only
    /// need to report protocol-level failures.
    async fn call_method(
        &self,
        path: &ObjectPath,
        interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>>;

    /// Start receiving signals selected by active match rules.
    async fn subscribe(&self, capacity: usize) -> Result<Subscription>;

    /// Stop delivering signals to a subscription.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Ask the bus to route signals selected by `rule` to this process.
    async fn add_match(&self, rule: &MatchRule) -> Result<()>;

    /// Undo a previous [`Bus::add_match`].
    async fn remove_match(&self, rule: &MatchRule) -> Result<()>;
}

/// Fan-out of received signals to every live subscription.
///
/// Tracks the active match rules so that only selected signals are
/// delivered, the way the bus daemon routes them. Each subscription owns a
/// bounded channel; a subscriber that falls behind loses signals rather than
/// growing a buffer without bound.
#[derive(Debug, Default)]
pub(crate) struct SignalFanout {
    next_id: AtomicU64,
    senders: Mutex<HashMap<SubscriptionId, mpsc::Sender<Signal>>>,
    rules: Mutex<Vec<MatchRule>>,
}

impl SignalFanout {
    pub(crate) fn add_rule(&self, rule: &MatchRule) {
        lock(&self.rules).push(rule.clone());
    }

    /// Removes one registration of `rule`; returns whether it was present.
    pub(crate) fn remove_rule(&self, rule: &MatchRule) -> bool {
        let mut rules = lock(&self.rules);
        match rules.iter().position(|r| r == rule) {
            Some(i) => {
                rules.remove(i);
                true
            }
            None => false,
        }
    }

    pub(crate) fn rules(&self) -> Vec<MatchRule> {
        lock(&self.rules).clone()
    }

    /// Deliver `signal` if any active rule selects it.
    pub(crate) fn deliver(&self, signal: &Signal) -> bool {
        let selected = lock(&self.rules).iter().any(|r| r.matches(signal));
        if selected {
            self.broadcast(signal);
        } else {
            debug!("No match rule selects {} from {}", signal.name(), signal.path);
        }
        selected
    }

    pub(crate) fn subscribe(&self, capacity: usize) -> Subscription {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.senders).insert(id, tx);
        Subscription { id, receiver: rx }
    }

    /// Returns whether the subscription existed.
    pub(crate) fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.senders).remove(&id).is_some()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        lock(&self.senders).len()
    }

    fn broadcast(&self, signal: &Signal) {
        lock(&self.senders).retain(|id, tx| match tx.try_send(signal.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                debug!("Subscription {} is full, dropping {}", id, signal.name());
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Subscription {} closed", id);
                false
            }
        });
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned table is still structurally valid.
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_rule_display() {
        assert_eq!(
            MatchRule::interfaces_added().to_string(),
            "type='signal',interface='org.freedesktop.DBus.ObjectManager',member='InterfacesAdded'"
        );
        let rule = MatchRule::properties_changed().path(ObjectPath::from("/org/bluez/hci0/dev_1"));
        assert_eq!(
            rule.to_string(),
            "type='signal',interface='org.freedesktop.DBus.Properties',member='PropertiesChanged',path='/org/bluez/hci0/dev_1'"
        );
    }

    #[test]
    fn test_match_rule_matches() {
        let signal = Signal::properties_changed(
            ObjectPath::from("/a"),
            "org.bluez.GattCharacteristic1",
            PropertyMap::new(),
        );
        assert!(MatchRule::properties_changed().matches(&signal));
        assert!(
            MatchRule::properties_changed()
                .path(ObjectPath::from("/a"))
                .matches(&signal)
        );
        assert!(
            !MatchRule::properties_changed()
                .path(ObjectPath::from("/b"))
                .matches(&signal)
        );
        assert!(!MatchRule::interfaces_added().matches(&signal));
    }

    #[test]
    fn test_signal_name() {
        let signal = Signal::interfaces_added(ObjectPath::from("/x"), InterfaceMap::new());
        assert_eq!(signal.name(), "org.freedesktop.DBus.ObjectManager.InterfacesAdded");
        assert_eq!(signal.path.as_str(), "/");
    }

    #[tokio::test]
    async fn test_fanout_delivers_to_all_and_drops_when_full() {
        let fanout = SignalFanout::default();
        fanout.add_rule(&MatchRule::interfaces_added());
        let mut a = fanout.subscribe(1);
        let mut b = fanout.subscribe(4);
        let signal = Signal::interfaces_added(ObjectPath::from("/x"), InterfaceMap::new());

        assert!(fanout.deliver(&signal));
        assert!(fanout.deliver(&signal));

        assert!(a.receiver.recv().await.is_some());
        assert!(a.receiver.try_recv().is_err());
        assert!(b.receiver.recv().await.is_some());
        assert!(b.receiver.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_fanout_requires_a_matching_rule() {
        let fanout = SignalFanout::default();
        let mut sub = fanout.subscribe(4);
        let signal = Signal::interfaces_added(ObjectPath::from("/x"), InterfaceMap::new());

        assert!(!fanout.deliver(&signal));
        fanout.add_rule(&MatchRule::interfaces_added());
        fanout.add_rule(&MatchRule::interfaces_added());
        assert!(fanout.remove_rule(&MatchRule::interfaces_added()));
        assert!(fanout.deliver(&signal));
        assert!(fanout.remove_rule(&MatchRule::interfaces_added()));
        assert!(!fanout.remove_rule(&MatchRule::interfaces_added()));
        assert!(!fanout.deliver(&signal));

        assert!(sub.receiver.try_recv().is_ok());
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_fanout_prunes_closed_and_unsubscribed() {
        let fanout = SignalFanout::default();
        fanout.add_rule(&MatchRule::interfaces_added());
        let a = fanout.subscribe(1);
        let b = fanout.subscribe(1);
        drop(a.receiver);
        assert!(fanout.unsubscribe(b.id));
        assert!(!fanout.unsubscribe(b.id));

        fanout.deliver(&Signal::interfaces_added(
            ObjectPath::from("/x"),
            InterfaceMap::new(),
        ));
        assert_eq!(fanout.subscriber_count(), 0);
    }
}
