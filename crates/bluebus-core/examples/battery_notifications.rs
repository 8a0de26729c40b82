//! Example: Battery Level Notifications
//!
//! Connects to the first peripheral advertising the Battery service,
//! reads the Battery Level characteristic, then prints every change until
//! Ctrl-C.
//!
//! Run with: `cargo run --example battery_notifications`

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use std::time::Duration;

    use bluebus_core::{DiscoveryRequest, Handle, Session};

    tracing_subscriber::fmt::init();

    let session = Session::open().await?;

    let request = DiscoveryRequest::new(["180f"]).timeout(Duration::from_secs(30));
    let device = session.discover(&request).await?;
    println!("Connecting to {}...", device.name());
    if !device.connected() {
        device.connect().await?;
    }
    // GATT objects appear once the connection resolves services
    session.refresh().await?;

    let level = session.characteristic("2a19")?;
    let value = level.read_value().await?;
    if let Some(percent) = value.first() {
        println!("Battery: {}%", percent);
    }

    session
        .handle_notify(&level, |value| {
            if let Some(percent) = value.first() {
                println!("Battery: {}%", percent);
            }
        })
        .await?;
    println!("Waiting for changes, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    session.stop_notify(&level).await?;
    session.close().await;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("BlueZ is only available on Linux");
}
