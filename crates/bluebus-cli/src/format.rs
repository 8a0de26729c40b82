//! Output formatting utilities for text and JSON output.

use std::collections::BTreeMap;

use anyhow::Result;
use bluebus_core::{Adapter, Device, Handle, ObjectPath, ObjectTree};
use bluebus_types::InterfaceMap;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool, compact: bool) -> Self {
        Self { no_color, compact }
    }

    /// Serialize to JSON, honoring `compact`, with a trailing newline.
    pub fn as_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    /// Apply a heading style unless colors are disabled.
    fn heading(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.bold().to_string()
        }
    }

    fn dim(&self, text: &str) -> String {
        if self.no_color {
            text.to_string()
        } else {
            text.dimmed().to_string()
        }
    }

    fn flag(&self, on: bool) -> String {
        let text = if on { "yes" } else { "no" };
        match (self.no_color, on) {
            (true, _) => text.to_string(),
            (false, true) => text.green().to_string(),
            (false, false) => text.red().to_string(),
        }
    }
}

/// Every object, ordered by path, with interfaces and properties.
pub fn format_objects_text(objects: &ObjectTree, opts: &FormatOptions) -> String {
    let mut out = String::new();
    for (path, interfaces) in sorted(objects) {
        out.push_str(&opts.heading(path.as_str()));
        out.push('\n');
        let interfaces: BTreeMap<_, _> = interfaces.iter().collect();
        for (name, properties) in interfaces {
            out.push_str(&format!("    {}\n", opts.dim(name)));
            for (key, value) in properties {
                out.push_str(&format!("        {} {}\n", key, value));
            }
        }
        out.push('\n');
    }
    out
}

pub fn format_objects_json(objects: &ObjectTree, opts: &FormatOptions) -> Result<String> {
    opts.as_json(&sorted(objects))
}

fn sorted(objects: &ObjectTree) -> BTreeMap<&ObjectPath, &InterfaceMap> {
    objects.iter().collect()
}

/// Summary of the adapter.
pub fn format_adapter_text(adapter: &Adapter, opts: &FormatOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", opts.heading(&adapter.name())));
    out.push_str(&format!("  Address:     {}\n", adapter.address()));
    out.push_str(&format!("  Powered:     {}\n", opts.flag(adapter.powered())));
    out.push_str(&format!("  Discovering: {}\n", opts.flag(adapter.discovering())));
    out.push_str(&format!("  {}\n", opts.dim(adapter.path().as_str())));
    out
}

/// Summary of a peripheral.
pub fn format_device_text(device: &Device, opts: &FormatOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", opts.heading(&device.name())));
    out.push_str(&format!(
        "  Address:   {} ({})\n",
        device.address(),
        device.address_type()
    ));
    out.push_str(&format!("  Connected: {}\n", opts.flag(device.connected())));
    out.push_str(&format!("  Paired:    {}\n", opts.flag(device.paired())));
    if let Some(rssi) = device.rssi() {
        out.push_str(&format!(
            "  Signal:    {}\n",
            style::format_signal_bar(rssi, opts.no_color)
        ));
    }
    let uuids = device
        .object()
        .property("UUIDs")
        .and_then(|v| v.as_str_array())
        .unwrap_or_default();
    if !uuids.is_empty() {
        out.push_str("  Services:\n");
        for uuid in uuids {
            out.push_str(&format!("    {}\n", uuid));
        }
    }
    out.push_str(&format!("  {}\n", opts.dim(device.path().as_str())));
    out
}

/// Bytes as lowercase hex, e.g. `0a1b2c`.
pub fn format_value_text(value: &[u8]) -> String {
    format!("{}\n", hex::encode(value))
}

#[derive(Serialize)]
struct ValueJson<'a> {
    path: &'a str,
    uuid: &'a str,
    hex: String,
    bytes: &'a [u8],
}

pub fn format_value_json(
    path: &str,
    uuid: &str,
    value: &[u8],
    opts: &FormatOptions,
) -> Result<String> {
    opts.as_json(&ValueJson {
        path,
        uuid,
        hex: hex::encode(value),
        bytes: value,
    })
}
