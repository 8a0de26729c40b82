//! Command-line tools for BLE peripherals managed by BlueZ.
//!
//! The `bluebus` binary wraps [`bluebus_core`]: each subcommand opens a
//! session on the system bus, performs one lookup, discovery or action, and
//! prints the result.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `objects` | Print every managed object with its interfaces and properties |
//! | `adapter` | Show the Bluetooth adapter |
//! | `device` | Show a known peripheral by address, service UUID or name |
//! | `discover` | Scan until a peripheral advertising the given services appears |
//! | `connect` | Discover a peripheral by service UUID and connect |
//! | `disconnect` | Disconnect a known peripheral by service UUID or name |
//! | `pair` | Discover, connect and pair |
//! | `read` | Read a characteristic value as hex |
//! | `write` | Write hex bytes to a characteristic |
//! | `notify` | Print value notifications until Ctrl-C |
//! | `config` | Show the configuration file |
//!
//! # Output Formats
//!
//! - **Text** (default): human-readable, colored unless `--no-color` or `NO_COLOR`
//! - **JSON** (`--json`): machine-readable; `--compact` disables pretty-printing
//!
//! # Configuration
//!
//! The CLI reads `~/.config/bluebus/config.toml` (or platform equivalent):
//!
//! - `call_timeout_secs`: deadline for each remote call (`--call-timeout` overrides)
//! - `discovery_timeout_secs`: discovery budget, 0 for none (`--timeout` overrides)
//! - `event_buffer`: capacity of signal channels
//! - `serialize_notifications`: deliver one characteristic's values in order
//!
//! # Examples
//!
//! Find a peripheral advertising the Battery service:
//! ```bash
//! bluebus discover 180f --timeout 15
//! ```
//!
//! Read its battery level:
//! ```bash
//! bluebus connect 180f && bluebus read 2a19
//! ```
//!
//! Stream heart-rate measurements as JSON lines:
//! ```bash
//! bluebus --json --compact notify 2a37
//! ```

// This crate is primarily a binary CLI application.
// The entry point and command implementations are in main.rs.

// Re-export core dependencies for convenience
pub use bluebus_core;
pub use bluebus_types;
