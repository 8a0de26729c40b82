//! Example: Discovering a Peripheral by Service
//!
//! Scans until a peripheral advertising the given service UUIDs appears,
//! then prints its address, name and signal strength.
//!
//! Run with: `cargo run --example discover_device -- 180f [180a ...]`

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::env;
    use std::time::Duration;

    use bluebus_core::{DiscoveryRequest, Handle, Session};

    tracing_subscriber::fmt::init();

    let uuids: Vec<String> = env::args().skip(1).collect();
    if uuids.is_empty() {
        eprintln!("Usage: discover_device <SERVICE_UUID>...");
        eprintln!();
        eprintln!("Example:");
        eprintln!("  discover_device 180f");
        std::process::exit(1);
    }

    let session = Session::open().await?;
    let adapter = session.adapter()?;
    println!("Using adapter {} ({})", adapter.name(), adapter.address());

    let request = DiscoveryRequest::new(&uuids).timeout(Duration::from_secs(30));
    println!("Discovering {}...", uuids.join(", "));
    let device = session.discover(&request).await?;

    println!();
    println!("Found {}", device.path());
    println!("  Address:   {}", device.address());
    println!("  Name:      {}", device.name());
    match device.rssi() {
        Some(rssi) => println!("  RSSI:      {} dBm", rssi),
        None => println!("  RSSI:      unknown"),
    }
    println!("  Services:  {}", device.uuids().join(", "));

    session.close().await;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("BlueZ is only available on Linux");
}
