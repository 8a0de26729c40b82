//! Adapter command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bluebus_core::Session;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_adapter_text};
use crate::util::write_output;

pub fn cmd_adapter(
    session: &Session,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let adapter = session
        .adapter()
        .context("No unique Bluetooth adapter")?;

    let content = match format {
        OutputFormat::Json => opts.as_json(&adapter)?,
        OutputFormat::Text => format_adapter_text(&adapter, opts),
    };
    write_output(output, &content)
}
