//! Property values exposed by the remote Bluetooth service.
//!
//! The service describes every object as a set of interfaces, each carrying a
//! map of named, dynamically typed properties. [`Value`] is the
//! transport-neutral form of one such property; the transport converts its
//! own variant type into it.

use core::fmt;
use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Properties of one interface, keyed by property name.
pub type PropertyMap = BTreeMap<String, Value>;

/// Interfaces implemented by one object, keyed by interface name.
pub type InterfaceMap = HashMap<String, PropertyMap>;

/// Every managed object of the remote service, keyed by path.
pub type ObjectTree = HashMap<ObjectPath, InterfaceMap>;

/// The path of a remote object, such as `/org/bluez/hci0/dev_AA_BB_CC_DD_EE_FF`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ObjectPath(String);

impl ObjectPath {
    /// Wrap a path string.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this path lies strictly below `parent` in the object tree.
    pub fn is_descendant_of(&self, parent: &ObjectPath) -> bool {
        self.0
            .strip_prefix(parent.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for ObjectPath {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl Borrow<str> for ObjectPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A dynamically typed property value.
///
/// Byte arrays and string arrays get their own variants because they are by
/// far the most common container types (characteristic values and UUID lists).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
#[non_exhaustive]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    ObjectPath(ObjectPath),
    Bytes(Vec<u8>),
    StringArray(Vec<String>),
    Array(Vec<Value>),
    Dict(PropertyMap),
}

impl Value {
    /// The value as a bool, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The value as a string slice. Object paths are returned as strings too.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::ObjectPath(p) => Some(p.as_str()),
            _ => None,
        }
    }

    /// The value as an object path.
    pub fn as_object_path(&self) -> Option<&ObjectPath> {
        match self {
            Self::ObjectPath(p) => Some(p),
            _ => None,
        }
    }

    /// The value as a byte slice.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// The value as a list of strings.
    pub fn as_str_array(&self) -> Option<&[String]> {
        match self {
            Self::StringArray(a) => Some(a),
            _ => None,
        }
    }

    /// The value as a signed integer, widening any integer variant that fits.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(i64::from(v)),
            Self::Int16(v) => Some(i64::from(v)),
            Self::UInt16(v) => Some(i64::from(v)),
            Self::Int32(v) => Some(i64::from(v)),
            Self::UInt32(v) => Some(i64::from(v)),
            Self::Int64(v) => Some(v),
            Self::UInt64(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// The value as a nested property map.
    pub fn as_dict(&self) -> Option<&PropertyMap> {
        match self {
            Self::Dict(d) => Some(d),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "0x{v:02x}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::ObjectPath(p) => write!(f, "{p}"),
            Self::Bytes(bytes) => {
                f.write_str("[")?;
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                f.write_str("]")
            }
            Self::StringArray(items) => write_list(f, items.iter().map(|s| format!("{s:?}"))),
            Self::Array(items) => write_list(f, items.iter().map(ToString::to_string)),
            Self::Dict(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: impl Iterator<Item = String>) -> fmt::Result {
    f.write_str("[")?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(&item)?;
    }
    f.write_str("]")
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<ObjectPath> for Value {
    fn from(v: ObjectPath) -> Self {
        Self::ObjectPath(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<Vec<String>> for Value {
    fn from(v: Vec<String>) -> Self {
        Self::StringArray(v)
    }
}

impl From<PropertyMap> for Value {
    fn from(v: PropertyMap) -> Self {
        Self::Dict(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Int16(v)
    }
}

impl From<u16> for Value {
    fn from(v: u16) -> Self {
        Self::UInt16(v)
    }
}
