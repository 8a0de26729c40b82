//! Device command implementation.

use std::path::PathBuf;

use anyhow::Result;
use bluebus_core::Session;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_device_text};
use crate::util::{DeviceQuery, write_output};

pub fn cmd_device(
    session: &Session,
    query: &DeviceQuery,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let device = query.find(session)?;

    let content = match format {
        OutputFormat::Json => opts.as_json(&device)?,
        OutputFormat::Text => format_device_text(&device, opts),
    };
    write_output(output, &content)
}
