//! Utility functions for CLI operations.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bluebus_core::{Device, DiscoveryRequest, Session, SessionConfig, uuids};
use bluebus_types::Address;
use tokio_util::sync::CancellationToken;

use crate::style;

/// How a command-line argument names a peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceQuery {
    Address(Address),
    Uuid(String),
    Name(String),
}

impl DeviceQuery {
    /// Classify `arg`: an address if it parses as one, else a service UUID
    /// if valid, else a name.
    pub fn parse(arg: &str) -> Self {
        if let Ok(address) = arg.parse() {
            Self::Address(address)
        } else if uuids::is_valid(arg) {
            Self::Uuid(arg.to_string())
        } else {
            Self::Name(arg.to_string())
        }
    }

    /// Like [`DeviceQuery::parse`], but never treats `arg` as an address.
    pub fn parse_without_address(arg: &str) -> Self {
        if uuids::is_valid(arg) {
            Self::Uuid(arg.to_string())
        } else {
            Self::Name(arg.to_string())
        }
    }

    /// Look the peripheral up in the session's snapshot.
    pub fn find(&self, session: &Session) -> Result<Device> {
        let found = match self {
            Self::Address(address) => session.device_by_address(address),
            Self::Uuid(uuid) => session.device_by_uuids(&[uuid]),
            Self::Name(name) => session.device_by_name(name),
        };
        found.with_context(|| format!("No unique device matching {}", self))
    }
}

impl std::fmt::Display for DeviceQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Address(address) => write!(f, "address {}", address),
            Self::Uuid(uuid) => write!(f, "service {}", uuid),
            Self::Name(name) => write!(f, "name '{}'", name),
        }
    }
}

/// Connect to the Bluetooth service on the system bus.
#[cfg(target_os = "linux")]
pub async fn open_session(config: SessionConfig) -> Result<Session> {
    Session::open_with_config(config)
        .await
        .context("Failed to connect to the Bluetooth service (is bluetoothd running?)")
}

#[cfg(not(target_os = "linux"))]
pub async fn open_session(_config: SessionConfig) -> Result<Session> {
    anyhow::bail!("The Bluetooth service is only reachable on Linux (BlueZ over D-Bus)")
}

/// A discovery request that Ctrl-C cancels.
pub fn interruptible_request(
    uuids: &[String],
    timeout: Duration,
    filter: bool,
) -> DiscoveryRequest {
    let token = CancellationToken::new();
    let on_interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });
    DiscoveryRequest::new(uuids.iter().cloned())
        .timeout(timeout)
        .filter(filter)
        .cancel_token(token)
}

/// Run discovery with a spinner on interactive terminals.
pub async fn discover_with_progress(
    session: &Session,
    request: &DiscoveryRequest,
    show_progress: bool,
) -> Result<Device> {
    let spinner = (show_progress && io::stderr().is_terminal())
        .then(|| style::discovering_spinner(request.uuids(), request.timeout_duration()));

    let result = session.discover(request).await;

    if let Some(sp) = spinner {
        sp.finish_and_clear();
    }
    result.with_context(|| {
        format!(
            "Failed to discover a peripheral with {}",
            request.uuids().join(", ")
        )
    })
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Append output to file or write it to stdout, for streamed lines.
pub fn append_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bluebus_core::{Handle, MockBus};

    use super::*;

    #[test]
    fn test_query_classification() {
        assert!(matches!(
            DeviceQuery::parse("C4:7C:8D:6A:2F:10"),
            DeviceQuery::Address(_)
        ));
        assert_eq!(DeviceQuery::parse("180f"), DeviceQuery::Uuid("180f".to_string()));
        assert_eq!(
            DeviceQuery::parse("Flower care"),
            DeviceQuery::Name("Flower care".to_string())
        );
    }

    #[test]
    fn test_query_without_address() {
        assert_eq!(
            DeviceQuery::parse_without_address("C4:7C:8D:6A:2F:10"),
            DeviceQuery::Name("C4:7C:8D:6A:2F:10".to_string())
        );
    }

    #[tokio::test]
    async fn test_query_find() {
        let bus = Arc::new(MockBus::new());
        bus.add_device(
            "/org/bluez/hci0/dev_C4_7C_8D_6A_2F_10",
            "/org/bluez/hci0",
            "C4:7C:8D:6A:2F:10",
            Some("Flower care"),
            &["0000180f-0000-1000-8000-00805f9b34fb"],
        );
        let session = Session::with_bus(bus, SessionConfig::default()).await.unwrap();

        for arg in ["c4:7c:8d:6a:2f:10", "180f", "Flower care"] {
            let device = DeviceQuery::parse(arg).find(&session).unwrap();
            assert_eq!(device.path().as_str(), "/org/bluez/hci0/dev_C4_7C_8D_6A_2F_10");
        }

        let err = DeviceQuery::parse("Thermometer").find(&session).unwrap_err();
        assert!(err.to_string().contains("name 'Thermometer'"));
    }

    #[test]
    fn test_write_output_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        write_output(Some(&path), "first\n").unwrap();
        append_output(Some(&path), "second\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
    }
}
