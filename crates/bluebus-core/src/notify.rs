//! Characteristic value notifications.
//!
//! One [`NotificationRegistry`] per session maps characteristic paths to
//! handlers. The first registration adds a bus-wide `PropertiesChanged`
//! match rule, opens a subscription and spawns the listener task. Every
//! later registration only adds a table entry, a path-scoped match rule and
//! a `StartNotify` call for its own characteristic. Registering the same
//! characteristic again swaps the handler without touching the peripheral.
//!
//! The listener looks the handler up when each signal arrives, so a
//! handler registered after the listener started is still found. Signals
//! for paths without a handler are dropped.
//!
//! Handlers must be safe to call concurrently: with
//! [`DispatchPolicy::Concurrent`] each notification runs on its own task,
//! so two notifications for one characteristic may be handled out of order.
//! [`DispatchPolicy::SerializedPerPath`] keeps per-characteristic order.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use bytes::Bytes;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bluebus_types::{ObjectPath, Value};

use crate::bus::{Bus, MatchRule, Signal, SignalBody, Subscription, SubscriptionId};
use crate::config::DispatchPolicy;
use crate::error::Result;
use crate::gatt::Characteristic;
use crate::object::Handle;

/// Callback receiving the new value of a characteristic.
pub type NotifyHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

type HandlerTable = Arc<RwLock<HashMap<ObjectPath, NotifyHandler>>>;

/// Per-path handler table fed by one shared listener task.
pub struct NotificationRegistry {
    bus: Arc<dyn Bus>,
    event_buffer: usize,
    dispatch: DispatchPolicy,
    handlers: HandlerTable,
    state: Mutex<RegistryState>,
}

#[derive(Default)]
struct RegistryState {
    listener: Option<Listener>,
    enabled: HashMap<ObjectPath, Characteristic>,
}

struct Listener {
    rule: MatchRule,
    subscription: SubscriptionId,
    task: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

impl NotificationRegistry {
    pub fn new(bus: Arc<dyn Bus>, event_buffer: usize, dispatch: DispatchPolicy) -> Self {
        Self {
            bus,
            event_buffer,
            dispatch,
            handlers: Arc::default(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Route value notifications of `characteristic` to `handler`.
    ///
    /// Enables notifications on the peripheral the first time a
    /// characteristic is registered. If enabling fails, the registration is
    /// undone and the error returned.
    pub async fn handle_notify<F>(&self, characteristic: &Characteristic, handler: F) -> Result<()>
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        let handler: NotifyHandler = Arc::new(handler);
        let path = characteristic.path().clone();
        let mut state = self.state.lock().await;

        if state.listener.is_none() {
            state.listener = Some(self.start_listener().await?);
        }

        if state.enabled.contains_key(&path) {
            debug!("{}: replacing notify handler", characteristic.name());
            write(&self.handlers).insert(path, handler);
            return Ok(());
        }

        write(&self.handlers).insert(path.clone(), handler);
        let rule = path_rule(&path);
        if let Err(e) = self.bus.add_match(&rule).await {
            write(&self.handlers).remove(&path);
            return Err(e);
        }
        if let Err(e) = characteristic.start_notify().await {
            write(&self.handlers).remove(&path);
            if let Err(cleanup) = self.bus.remove_match(&rule).await {
                warn!("Failed to remove match rule {}: {}", rule, cleanup);
            }
            return Err(e);
        }
        state.enabled.insert(path, characteristic.clone());
        Ok(())
    }

    /// Stop routing notifications of `characteristic` and disable them on
    /// the peripheral. Does nothing if it was not registered.
    pub async fn stop_notify(&self, characteristic: &Characteristic) -> Result<()> {
        let path = characteristic.path();
        let mut state = self.state.lock().await;
        write(&self.handlers).remove(path);
        if state.enabled.remove(path).is_none() {
            debug!("{}: no notify handler to remove", characteristic.name());
            return Ok(());
        }

        let result = characteristic.stop_notify().await;
        let rule = path_rule(path);
        if let Err(e) = self.bus.remove_match(&rule).await {
            warn!("Failed to remove match rule {}: {}", rule, e);
        }
        result
    }

    /// Disable every notification this registry enabled and stop the
    /// listener. Failures are logged; teardown always runs to completion.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        write(&self.handlers).clear();

        let mut enabled: Vec<_> = state.enabled.drain().collect();
        enabled.sort_by(|a, b| a.0.cmp(&b.0));
        for (path, characteristic) in enabled {
            if let Err(e) = characteristic.stop_notify().await {
                warn!("{}: failed to stop notifications: {}", characteristic.name(), e);
            }
            let rule = path_rule(&path);
            if let Err(e) = self.bus.remove_match(&rule).await {
                warn!("Failed to remove match rule {}: {}", rule, e);
            }
        }

        if let Some(mut listener) = state.listener.take() {
            listener.cancel_token.cancel();
            if let Err(e) = (&mut listener.task).await
                && e.is_panic()
            {
                warn!("Notification listener panicked: {}", e);
            }
            if let Err(e) = self.bus.unsubscribe(listener.subscription).await {
                warn!("Failed to unsubscribe {}: {}", listener.subscription, e);
            }
            if let Err(e) = self.bus.remove_match(&listener.rule).await {
                warn!("Failed to remove match rule {}: {}", listener.rule, e);
            }
            info!("Stopped notification listener");
        }
    }

    /// Whether the listener task has been started and not shut down.
    pub async fn is_listening(&self) -> bool {
        self.state.lock().await.listener.is_some()
    }

    /// Paths with a registered handler, in order.
    pub fn registered(&self) -> Vec<ObjectPath> {
        let mut paths: Vec<_> = read(&self.handlers).keys().cloned().collect();
        paths.sort();
        paths
    }

    async fn start_listener(&self) -> Result<Listener> {
        let rule = MatchRule::properties_changed();
        self.bus.add_match(&rule).await?;
        let subscription = match self.bus.subscribe(self.event_buffer).await {
            Ok(subscription) => subscription,
            Err(e) => {
                if let Err(cleanup) = self.bus.remove_match(&rule).await {
                    warn!("Failed to remove match rule {}: {}", rule, cleanup);
                }
                return Err(e);
            }
        };
        info!("Starting notification listener");

        let id = subscription.id;
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(listen(
            subscription,
            Arc::clone(&self.handlers),
            self.dispatch,
            self.event_buffer,
            cancel_token.clone(),
        ));
        Ok(Listener {
            rule,
            subscription: id,
            task,
            cancel_token,
        })
    }
}

impl fmt::Debug for NotificationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRegistry")
            .field("registered", &self.registered())
            .field("dispatch", &self.dispatch)
            .finish_non_exhaustive()
    }
}

fn path_rule(path: &ObjectPath) -> MatchRule {
    MatchRule::properties_changed().path(path.clone())
}

async fn listen(
    mut subscription: Subscription,
    handlers: HandlerTable,
    dispatch: DispatchPolicy,
    worker_buffer: usize,
    cancel_token: CancellationToken,
) {
    let mut workers: HashMap<ObjectPath, mpsc::Sender<(NotifyHandler, Bytes)>> = HashMap::new();
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Notification listener cancelled, stopping gracefully");
                break;
            }
            signal = subscription.receiver.recv() => {
                let Some(signal) = signal else {
                    debug!("Notification subscription closed, stopping");
                    break;
                };
                let Some((handler, data)) = route(&handlers, &signal) else {
                    if !read(&handlers).contains_key(&signal.path) {
                        workers.remove(&signal.path);
                    }
                    continue;
                };
                match dispatch {
                    DispatchPolicy::Concurrent => {
                        tokio::spawn(async move { handler(data) });
                    }
                    DispatchPolicy::SerializedPerPath => {
                        serialize(&mut workers, worker_buffer, signal.path, handler, data);
                    }
                }
            }
        }
    }
}

/// The handler and new value for a signal, if it carries one for a
/// registered path.
fn route(handlers: &HandlerTable, signal: &Signal) -> Option<(NotifyHandler, Bytes)> {
    let SignalBody::PropertiesChanged { changed, .. } = &signal.body else {
        return None;
    };
    let Some(handler) = read(handlers).get(&signal.path).cloned() else {
        debug!("{}: no notify handler", signal.path);
        return None;
    };
    debug!(
        "{}: notify {:?}",
        signal.path,
        changed.keys().collect::<Vec<_>>()
    );
    match changed.get("Value") {
        Some(Value::Bytes(data)) => Some((handler, Bytes::copy_from_slice(data))),
        _ => None,
    }
}

fn serialize(
    workers: &mut HashMap<ObjectPath, mpsc::Sender<(NotifyHandler, Bytes)>>,
    buffer: usize,
    path: ObjectPath,
    handler: NotifyHandler,
    data: Bytes,
) {
    let mut item = (handler, data);
    for _ in 0..2 {
        let tx = workers
            .entry(path.clone())
            .or_insert_with(|| spawn_worker(buffer));
        match tx.try_send(item) {
            Ok(()) => return,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("{}: notify worker is behind, dropping value", path);
                return;
            }
            Err(mpsc::error::TrySendError::Closed(returned)) => {
                // The worker died with a panicking handler; start a new one.
                workers.remove(&path);
                item = returned;
            }
        }
    }
}

fn spawn_worker(buffer: usize) -> mpsc::Sender<(NotifyHandler, Bytes)> {
    let (tx, mut rx) = mpsc::channel::<(NotifyHandler, Bytes)>(buffer.max(1));
    tokio::spawn(async move {
        while let Some((handler, data)) = rx.recv().await {
            handler(data);
        }
    });
    tx
}

fn read(table: &HandlerTable) -> std::sync::RwLockReadGuard<'_, HashMap<ObjectPath, NotifyHandler>> {
    table.read().unwrap_or_else(|e| e.into_inner())
}

fn write(table: &HandlerTable) -> std::sync::RwLockWriteGuard<'_, HashMap<ObjectPath, NotifyHandler>> {
    table.write().unwrap_or_else(|e| e.into_inner())
}
