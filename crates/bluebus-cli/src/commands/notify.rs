//! Notify command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bluebus_core::{Handle, Session};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_value_json, format_value_text};
use crate::util::append_output;

/// Notifications buffered between the handler and the printer.
const PRINT_BUFFER: usize = 256;

/// Print every value notification of a characteristic until Ctrl-C, or
/// until `count` values were printed when it is non-zero.
pub async fn cmd_notify(
    session: &Session,
    uuid: &str,
    count: u64,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let characteristic = session
        .characteristic(uuid)
        .with_context(|| format!("No unique characteristic {}", uuid))?;

    let (tx, mut rx) = mpsc::channel(PRINT_BUFFER);
    session
        .handle_notify(&characteristic, move |value| {
            if tx.try_send(value).is_err() {
                warn!("Printer is falling behind, dropping a notification");
            }
        })
        .await
        .with_context(|| format!("Failed to enable notifications on {}", characteristic.name()))?;
    info!("{}: waiting for notifications", characteristic.name());

    let path = characteristic.path().as_str();
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut printed = 0u64;
    let result = loop {
        tokio::select! {
            value = rx.recv() => {
                let Some(value) = value else { break Ok(()) };
                let content = match format {
                    OutputFormat::Json => format_value_json(path, characteristic.uuid(), &value, opts),
                    OutputFormat::Text => Ok(format_value_text(&value)),
                };
                if let Err(e) = content.and_then(|content| append_output(output, &content)) {
                    break Err(e);
                }
                printed += 1;
                if count != 0 && printed >= count {
                    break Ok(());
                }
            }
            _ = &mut interrupt => {
                info!("Interrupted");
                break Ok(());
            }
        }
    };

    if let Err(e) = session.stop_notify(&characteristic).await {
        warn!("Failed to stop notifications on {}: {}", characteristic.name(), e);
    }
    result
}
