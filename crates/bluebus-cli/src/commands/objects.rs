//! Objects command implementation.

use std::path::PathBuf;

use anyhow::Result;
use bluebus_core::Session;

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_objects_json, format_objects_text};
use crate::util::write_output;

pub fn cmd_objects(
    session: &Session,
    format: OutputFormat,
    output: Option<&PathBuf>,
    opts: &FormatOptions,
) -> Result<()> {
    let objects = session.objects();
    let content = match format {
        OutputFormat::Json => format_objects_json(&objects, opts)?,
        OutputFormat::Text => format_objects_text(&objects, opts),
    };
    write_output(output, &content)
}
