//! Visual styling utilities for the CLI.
//!
//! Spinners for operations that wait on the radio, and small colored
//! renderings shared by the formatters.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .expect("valid template")
        .tick_chars(SPINNER_TICK_CHARS)
}

/// Create a spinner for a discovery scan.
pub fn discovering_spinner(uuids: &[String], timeout: Duration) -> ProgressBar {
    let limit = if timeout.is_zero() {
        "no time limit".to_string()
    } else {
        format!("{}s", timeout.as_secs())
    };
    operation_spinner(&format!(
        "Discovering peripheral with {}... ({})",
        uuids.join(", "),
        limit
    ))
}

/// Create a spinner for generic operations.
pub fn operation_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Format RSSI as a visual signal bar.
/// RSSI typically ranges from -100 dBm (weak) to -30 dBm (strong).
pub fn format_signal_bar(rssi: i16, no_color: bool) -> String {
    // -30 dBm = excellent (10), -100 dBm = very weak (0)
    let strength = ((rssi.saturating_add(100)).clamp(0, 70) as f32 / 7.0).round() as usize;
    let filled = strength.min(10);
    let empty = 10 - filled;

    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(empty));

    if no_color {
        format!("{} {:>3} dBm", bar, rssi)
    } else if filled >= 7 {
        format!("{} {:>3} dBm", bar.green(), rssi)
    } else if filled >= 4 {
        format!("{} {:>3} dBm", bar.yellow(), rssi)
    } else {
        format!("{} {:>3} dBm", bar.red(), rssi)
    }
}
