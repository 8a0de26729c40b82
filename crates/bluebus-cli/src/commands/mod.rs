//! Command implementations for the CLI.

mod adapter;
mod connect;
mod device;
mod discover;
mod gatt;
mod notify;
mod objects;

pub use adapter::cmd_adapter;
pub use connect::{cmd_connect, cmd_disconnect, cmd_pair};
pub use device::cmd_device;
pub use discover::cmd_discover;
pub use gatt::{cmd_read, cmd_write};
pub use notify::cmd_notify;
pub use objects::cmd_objects;
