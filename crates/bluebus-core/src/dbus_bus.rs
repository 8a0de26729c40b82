//! System-bus transport built on the `dbus` and `dbus-tokio` crates.
//!
//! One connection is opened per [`DbusBus`]. Its I/O driver runs on a
//! spawned task, and a single catch-all receiver decodes every incoming
//! signal and hands it to the shared fan-out. Match rules are registered
//! with the bus daemon so that only selected signals reach this process.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbus::arg::{AppendAll, ArgType, Iter, IterAppend, PropMap, ReadAll, RefArg, TypeMismatchError, Variant};
use dbus::channel::{MatchingReceiver, Token};
use dbus::message::{MatchRule as DbusMatchRule, MessageType};
use dbus::nonblock::stdintf::org_freedesktop_dbus::ObjectManager;
use dbus::nonblock::{Proxy, SyncConnection};
use dbus::strings::BusName;
use dbus::{Message, Path};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use bluebus_types::{InterfaceMap, ObjectPath, ObjectTree, PropertyMap, Value};

use crate::bus::{
    Bus, INTERFACES_ADDED, MatchRule, OBJECT_MANAGER_INTERFACE, PROPERTIES_CHANGED,
    PROPERTIES_INTERFACE, SERVICE_NAME, Signal, SignalBody, SignalFanout, Subscription,
    SubscriptionId,
};
use crate::error::{Error, Result};

/// Deadline handed to the `dbus` crate itself.
///
/// Per-call deadlines are enforced above the transport; this only bounds
/// calls made outside the handle layer.
const TRANSPORT_TIMEOUT: Duration = Duration::from_secs(30);

/// A connection to the system bus.
pub struct DbusBus {
    connection: Arc<SyncConnection>,
    service: String,
    fanout: Arc<SignalFanout>,
    receiver: Option<Token>,
    driver: JoinHandle<()>,
}

impl DbusBus {
    /// Connect to the system bus and talk to the BlueZ daemon.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn system() -> Result<Self> {
        Self::system_with_service(SERVICE_NAME).await
    }

    /// Connect to the system bus and talk to the service registered as `service`.
    pub async fn system_with_service(service: &str) -> Result<Self> {
        BusName::new(service)
            .map_err(|e| Error::invalid_config(format!("invalid service name: {e}")))?;

        let (resource, connection) = dbus_tokio::connection::new_system_sync()?;
        let driver = tokio::spawn(async move {
            let err = resource.await;
            warn!("Lost connection to the system bus: {}", err);
        });

        let fanout = Arc::new(SignalFanout::default());
        let sink = Arc::clone(&fanout);
        let mut rule = DbusMatchRule::new();
        rule.msg_type = Some(MessageType::Signal);
        let token = connection.start_receive(
            rule,
            Box::new(move |msg: Message, _: &SyncConnection| {
                match signal_from_message(&msg) {
                    Some(signal) => {
                        sink.deliver(&signal);
                    }
                    None => debug!("Ignoring undecodable signal {:?}", msg.member()),
                }
                true
            }),
        );

        info!("Connected to the system bus as {:?}", connection.unique_name());
        Ok(Self {
            connection,
            service: service.to_string(),
            fanout,
            receiver: Some(token),
            driver,
        })
    }

    fn proxy<'a>(&'a self, path: &'a ObjectPath) -> Result<Proxy<'a, Arc<SyncConnection>>> {
        let path = Path::new(path.as_str()).map_err(Error::transport)?;
        Ok(Proxy::new(
            self.service.as_str(),
            path,
            TRANSPORT_TIMEOUT,
            Arc::clone(&self.connection),
        ))
    }
}

impl Drop for DbusBus {
    fn drop(&mut self) {
        if let Some(token) = self.receiver.take() {
            self.connection.stop_receive(token);
        }
        self.driver.abort();
    }
}

impl std::fmt::Debug for DbusBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbusBus")
            .field("service", &self.service)
            .field("unique_name", &self.connection.unique_name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Bus for DbusBus {
    async fn get_managed_objects(&self) -> Result<ObjectTree> {
        let root = ObjectPath::from("/");
        let objects = self.proxy(&root)?.get_managed_objects().await?;
        Ok(objects
            .into_iter()
            .map(|(path, interfaces)| {
                (
                    ObjectPath::from(path.to_string()),
                    interfaces_from_dbus(&interfaces),
                )
            })
            .collect())
    }

    async fn call_method(
        &self,
        path: &ObjectPath,
        interface: &str,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let args = args
            .iter()
            .map(refarg_from_value)
            .collect::<Result<Vec<_>>>()?;
        let proxy = self.proxy(path)?;
        let reply: DynamicReply = proxy
            .method_call(interface, method, DynamicArgs(args))
            .await?;
        Ok(reply.0)
    }

    async fn subscribe(&self, capacity: usize) -> Result<Subscription> {
        Ok(self.fanout.subscribe(capacity))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        if !self.fanout.unsubscribe(id) {
            debug!("Subscription {} was already gone", id);
        }
        Ok(())
    }

    async fn add_match(&self, rule: &MatchRule) -> Result<()> {
        self.connection.add_match_no_cb(&rule.to_string()).await?;
        self.fanout.add_rule(rule);
        Ok(())
    }

    async fn remove_match(&self, rule: &MatchRule) -> Result<()> {
        self.fanout.remove_rule(rule);
        self.connection.remove_match_no_cb(&rule.to_string()).await?;
        Ok(())
    }
}

/// Method arguments converted to `dbus` values.
struct DynamicArgs(Vec<Box<dyn RefArg>>);

impl AppendAll for DynamicArgs {
    fn append(&self, ia: &mut IterAppend) {
        for arg in &self.0 {
            RefArg::append(&**arg, ia);
        }
    }
}

/// Every value of a method reply, whatever its signature.
struct DynamicReply(Vec<Value>);

impl ReadAll for DynamicReply {
    fn read(i: &mut Iter) -> std::result::Result<Self, TypeMismatchError> {
        let mut values = Vec::new();
        while let Some(arg) = i.get_refarg() {
            values.push(value_from_refarg(&*arg));
            if !i.next() {
                break;
            }
        }
        Ok(Self(values))
    }
}

fn signal_from_message(msg: &Message) -> Option<Signal> {
    let path = ObjectPath::from(msg.path()?.to_string());
    let interface = msg.interface()?.to_string();
    let member = msg.member()?.to_string();

    let body = match (interface.as_str(), member.as_str()) {
        (OBJECT_MANAGER_INTERFACE, INTERFACES_ADDED) => {
            let (object, interfaces): (Path, HashMap<String, PropMap>) = msg.read2().ok()?;
            SignalBody::InterfacesAdded {
                object: ObjectPath::from(object.to_string()),
                interfaces: interfaces_from_dbus(&interfaces),
            }
        }
        (PROPERTIES_INTERFACE, PROPERTIES_CHANGED) => {
            let (changed_interface, changed, invalidated): (String, PropMap, Vec<String>) =
                msg.read3().ok()?;
            SignalBody::PropertiesChanged {
                interface: changed_interface,
                changed: props_from_dbus(&changed),
                invalidated,
            }
        }
        _ => SignalBody::Other,
    };

    Some(Signal {
        path,
        interface,
        member,
        body,
    })
}

fn interfaces_from_dbus(interfaces: &HashMap<String, PropMap>) -> InterfaceMap {
    interfaces
        .iter()
        .map(|(name, props)| (name.clone(), props_from_dbus(props)))
        .collect()
}

fn props_from_dbus(props: &PropMap) -> PropertyMap {
    props
        .iter()
        .map(|(name, variant)| (name.clone(), value_from_refarg(&*variant.0)))
        .collect()
}

fn value_from_refarg(arg: &dyn RefArg) -> Value {
    match arg.arg_type() {
        ArgType::Boolean => Value::Bool(arg.as_u64() == Some(1)),
        ArgType::Byte => Value::Byte(arg.as_u64().unwrap_or_default() as u8),
        ArgType::Int16 => Value::Int16(arg.as_i64().unwrap_or_default() as i16),
        ArgType::UInt16 => Value::UInt16(arg.as_u64().unwrap_or_default() as u16),
        ArgType::Int32 => Value::Int32(arg.as_i64().unwrap_or_default() as i32),
        ArgType::UInt32 => Value::UInt32(arg.as_u64().unwrap_or_default() as u32),
        ArgType::Int64 => Value::Int64(arg.as_i64().unwrap_or_default()),
        ArgType::UInt64 => Value::UInt64(arg.as_u64().unwrap_or_default()),
        ArgType::Double => Value::Double(arg.as_f64().unwrap_or_default()),
        ArgType::String | ArgType::Signature => {
            Value::String(arg.as_str().unwrap_or_default().to_string())
        }
        ArgType::ObjectPath => Value::ObjectPath(ObjectPath::from(arg.as_str().unwrap_or_default())),
        ArgType::Variant => arg
            .as_iter()
            .and_then(|mut inner| inner.next().map(value_from_refarg))
            .unwrap_or(Value::Array(Vec::new())),
        ArgType::Array => array_from_refarg(arg),
        ArgType::Struct | ArgType::DictEntry => Value::Array(
            arg.as_iter()
                .map(|items| items.map(value_from_refarg).collect())
                .unwrap_or_default(),
        ),
        other => {
            debug!("Unsupported argument type {:?}", other);
            Value::Array(Vec::new())
        }
    }
}

fn array_from_refarg(arg: &dyn RefArg) -> Value {
    let signature = arg.signature();
    let items: Vec<&dyn RefArg> = arg.as_iter().map(Iterator::collect).unwrap_or_default();
    match &*signature {
        "ay" => Value::Bytes(
            items
                .iter()
                .filter_map(|b| b.as_u64())
                .map(|b| b as u8)
                .collect(),
        ),
        "as" | "ao" => Value::StringArray(
            items
                .iter()
                .filter_map(|s| s.as_str())
                .map(str::to_string)
                .collect(),
        ),
        s if s.starts_with("a{") => Value::Dict(
            // Dict iterators yield keys and values alternately.
            items
                .chunks_exact(2)
                .map(|pair| (dict_key(pair[0]), value_from_refarg(pair[1])))
                .collect(),
        ),
        _ => Value::Array(items.into_iter().map(value_from_refarg).collect()),
    }
}

fn dict_key(key: &dyn RefArg) -> String {
    key.as_str()
        .map(str::to_string)
        .or_else(|| key.as_u64().map(|v| v.to_string()))
        .or_else(|| key.as_i64().map(|v| v.to_string()))
        .unwrap_or_default()
}

fn refarg_from_value(value: &Value) -> Result<Box<dyn RefArg>> {
    let arg: Box<dyn RefArg> = match value {
        Value::Bool(v) => Box::new(*v),
        Value::Byte(v) => Box::new(*v),
        Value::Int16(v) => Box::new(*v),
        Value::UInt16(v) => Box::new(*v),
        Value::Int32(v) => Box::new(*v),
        Value::UInt32(v) => Box::new(*v),
        Value::Int64(v) => Box::new(*v),
        Value::UInt64(v) => Box::new(*v),
        Value::Double(v) => Box::new(*v),
        Value::String(s) => Box::new(s.clone()),
        Value::ObjectPath(p) => {
            Box::new(Path::new(p.as_str().to_string()).map_err(Error::transport)?)
        }
        Value::Bytes(b) => Box::new(b.clone()),
        Value::StringArray(a) => Box::new(a.clone()),
        Value::Array(items) => Box::new(
            items
                .iter()
                .map(|v| refarg_from_value(v).map(Variant))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Dict(map) => Box::new(propmap_from_props(map)?),
        other => {
            return Err(Error::transport(format!(
                "unsupported argument {other:?}"
            )));
        }
    };
    Ok(arg)
}

fn propmap_from_props(props: &PropertyMap) -> Result<PropMap> {
    props
        .iter()
        .map(|(k, v)| Ok((k.clone(), Variant(refarg_from_value(v)?))))
        .collect()
}
