//! Platform-agnostic types for bluebus.
//!
//! This crate provides the data model shared by the bus transport, the object
//! cache and the command-line tools, without depending on any particular
//! message-bus implementation.
//!
//! # Features
//!
//! - UUID validation, expansion to 128-bit form and contraction to short form
//! - Bluetooth device address parsing
//! - Transport-neutral property values and object-tree types
//! - Error types for parsing
//!
//! # Example
//!
//! ```
//! use bluebus_types::uuid;
//!
//! assert!(uuid::is_valid("180f"));
//! assert_eq!(uuid::canonicalize("180f"), "0000180f-0000-1000-8000-00805f9b34fb");
//! ```

pub mod address;
pub mod error;
pub mod uuid;
pub mod value;

pub use address::Address;
pub use error::{ParseError, ParseResult};
pub use self::uuid as uuids;
pub use value::{InterfaceMap, ObjectPath, ObjectTree, PropertyMap, Value};
