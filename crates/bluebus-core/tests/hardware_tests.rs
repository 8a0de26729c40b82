//! Hardware integration tests for bluebus-core
//!
//! These tests need a running BlueZ daemon, a powered adapter and a
//! peripheral in range. Run them with:
//! ```
//! cargo test --package bluebus-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the peripheral via environment variables:
//! - `BLUEBUS_SERVICE_UUID`: a service UUID the peripheral advertises (default `180f`)
//! - `BLUEBUS_DEVICE`: the peripheral's address, to disambiguate several matches
//!
//! Example:
//! ```
//! BLUEBUS_SERVICE_UUID=180d BLUEBUS_DEVICE=C4:7C:8D:6A:2F:10 cargo test --package bluebus-core --test hardware_tests -- --ignored --nocapture
//! ```
#![cfg(target_os = "linux")]

use std::env;
use std::time::Duration;

use bluebus_core::{Address, DiscoveryRequest, Handle, Session};
use tokio::time::timeout;

/// Default discovery budget
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(20);

/// Outer bound for a whole test step
const STEP_TIMEOUT: Duration = Duration::from_secs(30);

fn service_uuid() -> String {
    env::var("BLUEBUS_SERVICE_UUID")
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "180f".to_string())
}

fn device_address() -> Option<Address> {
    env::var("BLUEBUS_DEVICE")
        .ok()
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().expect("BLUEBUS_DEVICE is not a valid address"))
}

fn request() -> DiscoveryRequest {
    let request = DiscoveryRequest::new([service_uuid()]).timeout(DISCOVERY_TIMEOUT);
    match device_address() {
        Some(address) => request.address(address),
        None => request,
    }
}

// =============================================================================
// Session Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BlueZ"]
async fn test_open_session_and_list_objects() {
    let session = timeout(STEP_TIMEOUT, Session::open())
        .await
        .expect("opening the session timed out")
        .expect("failed to open session");

    let adapter = session.adapter().expect("no unique adapter");
    println!("Adapter {} ({})", adapter.name(), adapter.address());
    println!("{}", session.cache());

    session.close().await;
}

// =============================================================================
// Discovery Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_discover_peripheral() {
    let session = Session::open().await.expect("failed to open session");

    match timeout(STEP_TIMEOUT, session.discover(&request())).await {
        Ok(Ok(device)) => {
            println!("Discovered {} ({})", device.name(), device.address());
            println!("  RSSI: {:?}", device.rssi());
        }
        Ok(Err(e)) => panic!("Discovery failed: {}", e),
        Err(_) => panic!("Discovery did not return within {:?}", STEP_TIMEOUT),
    }

    let adapter = session.adapter().expect("no unique adapter");
    session.refresh().await.expect("refresh failed");
    assert!(!session.adapter().unwrap().discovering(), "{} still discovering", adapter.name());

    session.close().await;
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_discover_unknown_service_times_out() {
    let session = Session::open().await.expect("failed to open session");

    let request = DiscoveryRequest::new(["6e400001-b5a3-f393-e0a9-e50e24dcca9e"])
        .timeout(Duration::from_secs(3));
    let result = session.discover(&request).await;
    println!("Result: {:?}", result.as_ref().map(|d| d.name()));

    session.close().await;
}

// =============================================================================
// GATT Tests
// =============================================================================

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_read_battery_level() {
    let session = Session::open().await.expect("failed to open session");
    let device = session.discover(&request()).await.expect("discovery failed");

    timeout(STEP_TIMEOUT, device.connect())
        .await
        .expect("connect timed out")
        .expect("connect failed");

    // Services resolve asynchronously after connecting
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.refresh().await.expect("refresh failed");

    match session.characteristic("2a19") {
        Ok(level) => {
            let value = level.read_value().await.expect("read failed");
            println!("Battery level: {:?}", value);
        }
        Err(e) => println!("No battery level characteristic: {}", e),
    }

    device.disconnect().await.expect("disconnect failed");
    session.close().await;
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_battery_notifications() {
    let session = Session::open().await.expect("failed to open session");
    let device = session.discover(&request()).await.expect("discovery failed");
    device.connect().await.expect("connect failed");
    tokio::time::sleep(Duration::from_secs(2)).await;
    session.refresh().await.expect("refresh failed");

    let Ok(level) = session.characteristic("2a19") else {
        println!("Peripheral has no battery level characteristic, skipping");
        device.disconnect().await.ok();
        session.close().await;
        return;
    };

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    if let Err(e) = session
        .handle_notify(&level, move |value| {
            let _ = tx.send(value);
        })
        .await
    {
        println!("Notifications not supported: {}", e);
    } else {
        match timeout(Duration::from_secs(10), rx.recv()).await {
            Ok(Some(value)) => println!("Notified: {:?}", value),
            _ => println!("No notification within 10s"),
        }
    }

    session.close().await;
    device.disconnect().await.ok();
}
