//! Snapshot of the remote service's object tree.
//!
//! The [`ObjectCache`] holds the result of the last `GetManagedObjects` call.
//! A refresh fetches a complete new tree and swaps it in as a whole, so a
//! reader sees either the old snapshot or the new one and never a mix.
//! Lookups are strict: exactly one object must match, otherwise the lookup
//! fails with [`Error::NotFound`] or [`Error::Ambiguous`].

use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::debug;

use bluebus_types::{Address, ObjectPath, ObjectTree, ParseError, uuids};

use crate::adapter::Adapter;
use crate::bus::{Bus, OBJECT_MANAGER_INTERFACE};
use crate::device::Device;
use crate::error::{Error, Result};
use crate::gatt::{Characteristic, Descriptor, Service};
use crate::object::{Handle, RemoteObject, write_properties};

/// Shared, atomically replaced snapshot of remote objects.
pub struct ObjectCache {
    bus: Arc<dyn Bus>,
    snapshot: RwLock<Arc<ObjectTree>>,
    call_timeout: Duration,
}

impl ObjectCache {
    /// Create an empty cache. Call [`ObjectCache::refresh`] to load it.
    pub fn new(bus: Arc<dyn Bus>, call_timeout: Duration) -> Self {
        Self {
            bus,
            snapshot: RwLock::new(Arc::new(ObjectTree::new())),
            call_timeout,
        }
    }

    /// Replace the snapshot with the service's current object tree.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<()> {
        let fetch = self.bus.get_managed_objects();
        let objects = match tokio::time::timeout(self.call_timeout, fetch).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::CallTimeout {
                    method: format!("{OBJECT_MANAGER_INTERFACE}.GetManagedObjects"),
                    path: ObjectPath::from("/"),
                    duration: self.call_timeout,
                });
            }
        };
        debug!("Loaded {} managed objects", objects.len());
        *self
            .snapshot
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Arc::new(objects);
        Ok(())
    }

    /// The current snapshot. It does not change when the cache is refreshed.
    pub fn snapshot(&self) -> Arc<ObjectTree> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Number of objects in the current snapshot.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Every object implementing `interface` that satisfies `predicate`,
    /// ordered by path.
    pub fn find_all<P>(&self, interface: &str, predicate: P) -> Vec<RemoteObject>
    where
        P: Fn(&RemoteObject) -> bool,
    {
        let snapshot = self.snapshot();
        let mut found: Vec<RemoteObject> = snapshot
            .iter()
            .filter_map(|(path, interfaces)| {
                let props = interfaces.get(interface)?;
                Some(RemoteObject::new(
                    Arc::clone(&self.bus),
                    path.clone(),
                    interface,
                    props.clone(),
                    self.call_timeout,
                ))
            })
            .filter(|object| predicate(object))
            .collect();
        found.sort_by(|a, b| a.path().cmp(b.path()));
        found
    }

    /// The unique object implementing `interface` that satisfies `predicate`.
    pub fn find<P>(&self, interface: &str, predicate: P) -> Result<RemoteObject>
    where
        P: Fn(&RemoteObject) -> bool,
    {
        let mut found = self.find_all(interface, predicate);
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(Error::not_found(interface, "")),
            count => Err(Error::ambiguous(interface, "", count)),
        }
    }

    /// The unique handle of type `H` that satisfies `predicate`.
    pub fn find_handle<H, P>(&self, predicate: P) -> Result<H>
    where
        H: Handle,
        P: Fn(&H) -> bool,
    {
        let mut found = self.handles::<H>();
        found.retain(|handle| predicate(handle));
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(Error::not_found(H::INTERFACE, "")),
            count => Err(Error::ambiguous(H::INTERFACE, "", count)),
        }
    }

    /// Every object of handle type `H`, ordered by path.
    pub fn handles<H: Handle>(&self) -> Vec<H> {
        self.find_all(H::INTERFACE, |_| true)
            .into_iter()
            .map(H::from_object)
            .collect()
    }
}

/// Typed lookups.
impl ObjectCache {
    /// The unique adapter.
    pub fn adapter(&self) -> Result<Adapter> {
        self.find_handle(|_: &Adapter| true)
    }

    /// Every known peripheral, ordered by path.
    pub fn devices(&self) -> Vec<Device> {
        self.handles()
    }

    /// The peripheral with the given address.
    pub fn device_by_address(&self, address: &Address) -> Result<Device> {
        self.find_handle(|d: &Device| d.address() == *address)
            .map_err(|e| e.with_criteria(format!(" with address {address}")))
    }

    /// The peripheral whose `Name` is exactly `name`.
    pub fn device_by_name(&self, name: &str) -> Result<Device> {
        self.find_handle(|d: &Device| d.name() == name)
            .map_err(|e| e.with_criteria(format!(" with name {name:?}")))
    }

    /// The peripheral advertising all of `uuids`.
    ///
    /// Fails with [`Error::InvalidIdentifier`] if any of `required` is malformed.
    pub fn device_by_uuids<S: AsRef<str>>(&self, required: &[S]) -> Result<Device> {
        let wanted: Vec<&str> = required.iter().map(AsRef::as_ref).collect();
        if let Some(bad) = wanted.iter().find(|u| !uuids::is_valid(u)) {
            return Err(ParseError::InvalidUuid(bad.to_string()).into());
        }
        self.find_handle(|d: &Device| uuids::uuids_include(d.advertised_uuids(), &wanted))
            .map_err(|e| e.with_criteria(format!(" with UUIDs {wanted:?}")))
    }

    /// The GATT service with the given UUID.
    pub fn service(&self, uuid: &str) -> Result<Service> {
        self.find_by_uuid(uuid, Service::uuid)
    }

    /// The GATT characteristic with the given UUID.
    pub fn characteristic(&self, uuid: &str) -> Result<Characteristic> {
        self.find_by_uuid(uuid, Characteristic::uuid)
    }

    /// The GATT descriptor with the given UUID.
    pub fn descriptor(&self, uuid: &str) -> Result<Descriptor> {
        self.find_by_uuid(uuid, Descriptor::uuid)
    }

    fn find_by_uuid<H, F>(&self, uuid: &str, uuid_of: F) -> Result<H>
    where
        H: Handle,
        F: Fn(&H) -> &str,
    {
        let wanted = uuids::try_canonicalize(uuid)?;
        self.find_handle(|h: &H| {
            uuids::try_canonicalize(&uuid_of(h).to_ascii_lowercase()).is_ok_and(|u| u == wanted)
        })
        .map_err(|e| e.with_criteria(format!(" with UUID {uuid}")))
    }
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("objects", &self.len())
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

/// Prints every object, its interfaces and their properties, ordered by path.
impl fmt::Display for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.snapshot();
        let mut paths: Vec<&ObjectPath> = snapshot.keys().collect();
        paths.sort();
        for path in paths {
            writeln!(f, "{path}")?;
            let interfaces = &snapshot[path];
            let mut names: Vec<&String> = interfaces.keys().collect();
            names.sort();
            for name in names {
                writeln!(f, "    {name}")?;
                write_properties(f, "        ", &interfaces[name])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
