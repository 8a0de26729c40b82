//! Discover command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bluebus_core::{DiscoveryRequest, Session};
use bluebus_types::Address;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_device_text};
use crate::util::{discover_with_progress, write_output};

pub async fn cmd_discover(
    session: &Session,
    request: DiscoveryRequest,
    address: Option<&str>,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    opts: &FormatOptions,
) -> Result<()> {
    let request = match address {
        Some(address) => {
            let address: Address = address
                .parse()
                .with_context(|| format!("Invalid address '{}'", address))?;
            request.address(address)
        }
        None => request,
    };

    let show_progress = !quiet && matches!(format, OutputFormat::Text);
    let device = discover_with_progress(session, &request, show_progress).await?;

    let content = match format {
        OutputFormat::Json => opts.as_json(&device)?,
        OutputFormat::Text => format_device_text(&device, opts),
    };
    write_output(output, &content)
}
