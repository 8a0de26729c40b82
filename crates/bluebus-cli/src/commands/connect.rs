//! Connect, disconnect and pair command implementations.

use anyhow::{Context, Result};
use bluebus_core::{Device, DiscoveryRequest, Handle, Session};
use tracing::info;

use crate::util::{DeviceQuery, discover_with_progress};

/// Discover the peripheral and connect unless it already is.
pub async fn cmd_connect(session: &Session, request: &DiscoveryRequest, quiet: bool) -> Result<()> {
    let device = discover_with_progress(session, request, !quiet).await?;
    ensure_connected(&device).await
}

/// Discover the peripheral, then connect and pair as needed.
pub async fn cmd_pair(session: &Session, request: &DiscoveryRequest, quiet: bool) -> Result<()> {
    let device = discover_with_progress(session, request, !quiet).await?;
    ensure_connected(&device).await?;

    if device.paired() {
        info!("{}: already paired", device.name());
        return Ok(());
    }
    device
        .pair()
        .await
        .with_context(|| format!("Failed to pair with {}", device.name()))
}

/// Disconnect a known peripheral if it is connected.
pub async fn cmd_disconnect(session: &Session, query: &DeviceQuery) -> Result<()> {
    let device = query.find(session)?;

    if !device.connected() {
        info!("{}: not connected", device.name());
        return Ok(());
    }
    device
        .disconnect()
        .await
        .with_context(|| format!("Failed to disconnect {}", device.name()))
}

async fn ensure_connected(device: &Device) -> Result<()> {
    if device.connected() {
        info!("{}: already connected", device.name());
        return Ok(());
    }
    device
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", device.name()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use bluebus_core::{MockBus, SessionConfig, Value};

    use super::*;

    const DEVICE: &str = "/org/bluez/hci0/dev_C4_7C_8D_6A_2F_10";

    async fn open_session(connected: bool, paired: bool) -> (Arc<MockBus>, Session) {
        let bus = Arc::new(MockBus::new());
        bus.add_adapter("/org/bluez/hci0", "00:1A:7D:DA:71:13");
        let mut props = bluebus_core::mock::device_properties(
            "/org/bluez/hci0",
            "C4:7C:8D:6A:2F:10",
            Some("Flower care"),
            &["0000180f-0000-1000-8000-00805f9b34fb"],
        );
        props.insert("Connected".to_string(), Value::from(connected));
        props.insert("Paired".to_string(), Value::from(paired));
        bus.insert_object(DEVICE, bluebus_core::DEVICE_INTERFACE, props);
        let session = Session::with_bus(bus.clone(), SessionConfig::default())
            .await
            .unwrap();
        (bus, session)
    }

    fn request() -> DiscoveryRequest {
        DiscoveryRequest::new(["180f"]).timeout(Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_connect_skips_connected_device() {
        let (bus, session) = open_session(true, false).await;
        cmd_connect(&session, &request(), true).await.unwrap();
        assert_eq!(bus.call_count("Connect"), 0);
    }

    #[tokio::test]
    async fn test_pair_connects_then_pairs() {
        let (bus, session) = open_session(false, false).await;
        cmd_pair(&session, &request(), true).await.unwrap();
        let methods: Vec<_> = bus.calls().into_iter().map(|c| c.method).collect();
        assert_eq!(methods, ["Connect", "Pair"]);
    }

    #[tokio::test]
    async fn test_pair_skips_paired_device() {
        let (bus, session) = open_session(true, true).await;
        cmd_pair(&session, &request(), true).await.unwrap();
        assert!(bus.calls().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_only_when_connected() {
        let (bus, session) = open_session(false, false).await;
        cmd_disconnect(&session, &DeviceQuery::parse("Flower care"))
            .await
            .unwrap();
        assert_eq!(bus.call_count("Disconnect"), 0);

        let (bus, session) = open_session(true, false).await;
        cmd_disconnect(&session, &DeviceQuery::parse("180f"))
            .await
            .unwrap();
        assert_eq!(bus.call_count("Disconnect"), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_has_context() {
        let (bus, session) = open_session(false, false).await;
        bus.fail_method("Connect", "org.bluez.Error.Failed");
        let err = cmd_connect(&session, &request(), true).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to connect to Flower care"));
        assert!(format!("{:#}", err).contains("org.bluez.Error.Failed"));
    }
}
