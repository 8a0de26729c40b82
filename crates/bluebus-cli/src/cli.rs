//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Reusable discovery arguments
#[derive(Debug, Clone, Args)]
pub struct DiscoveryArgs {
    /// Discovery timeout in seconds (0 waits forever; default from config)
    #[arg(short = 'T', long)]
    pub timeout: Option<u64>,

    /// Skip the server-side discovery filter
    #[arg(long)]
    pub no_filter: bool,
}

#[derive(Parser)]
#[command(name = "bluebus")]
#[command(author, version, about = "Tools for BLE peripherals managed by BlueZ", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Per-call timeout in seconds (default from config)
    #[arg(long, global = true)]
    pub call_timeout: Option<u64>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print every object the Bluetooth service manages
    Objects,

    /// Show the Bluetooth adapter
    Adapter,

    /// Show a known peripheral
    Device {
        /// Address, advertised service UUID, or name
        device: String,
    },

    /// Scan until a peripheral advertising the given services appears
    Discover {
        /// Service UUIDs the peripheral must advertise
        #[arg(required = true)]
        uuids: Vec<String>,

        /// Also require this address
        #[arg(short, long)]
        address: Option<String>,

        #[command(flatten)]
        discovery: DiscoveryArgs,
    },

    /// Discover a peripheral by service UUID and connect to it
    Connect {
        /// Service UUID the peripheral advertises
        uuid: String,

        #[command(flatten)]
        discovery: DiscoveryArgs,
    },

    /// Disconnect a known peripheral
    Disconnect {
        /// Advertised service UUID or name
        device: String,
    },

    /// Discover a peripheral by service UUID, connect and pair
    Pair {
        /// Service UUID the peripheral advertises
        uuid: String,

        #[command(flatten)]
        discovery: DiscoveryArgs,
    },

    /// Read a characteristic value
    Read {
        /// Characteristic UUID
        characteristic: String,
    },

    /// Write a characteristic value
    Write {
        /// Characteristic UUID
        characteristic: String,

        /// Value as hex bytes (e.g. "0102ff" or "01:02:ff")
        #[arg(value_parser = parse_hex)]
        value: HexBytes,
    },

    /// Print value notifications of a characteristic until interrupted
    Notify {
        /// Characteristic UUID
        characteristic: String,

        /// Stop after this many notifications (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u64,
    },

    /// Show configuration file path and contents
    Config,
}

/// Raw bytes parsed from a hex argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

/// Parse hex bytes, tolerating `0x`, spaces and `:`/`-` separators
fn parse_hex(s: &str) -> Result<HexBytes, String> {
    let trimmed = s.trim();
    let trimmed = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let digits: String = trimmed
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | ' '))
        .collect();
    if digits.is_empty() {
        return Err("value must contain at least one byte".to_string());
    }
    hex::decode(&digits)
        .map(HexBytes)
        .map_err(|e| format!("'{}' is not valid hex: {}", s, e))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_hex_accepts_separators() {
        assert_eq!(parse_hex("0102ff").unwrap(), HexBytes(vec![1, 2, 0xff]));
        assert_eq!(parse_hex("01:02:FF").unwrap(), HexBytes(vec![1, 2, 0xff]));
        assert_eq!(parse_hex("0x01 02").unwrap(), HexBytes(vec![1, 2]));
    }

    #[test]
    fn test_parse_hex_rejects_bad_input() {
        assert!(parse_hex("").is_err());
        assert!(parse_hex("0x").is_err());
        assert!(parse_hex("abc").is_err());
        assert!(parse_hex("zz").is_err());
    }

    #[test]
    fn test_json_flag_selects_format() {
        let cli = Cli::parse_from(["bluebus", "--json", "objects"]);
        assert_eq!(cli.format(), OutputFormat::Json);
        let cli = Cli::parse_from(["bluebus", "adapter"]);
        assert_eq!(cli.format(), OutputFormat::Text);
    }

    #[test]
    fn test_discover_arguments() {
        let cli = Cli::parse_from([
            "bluebus", "discover", "180f", "180a", "--address", "C4:7C:8D:6A:2F:10", "-T", "5",
        ]);
        match cli.command {
            Commands::Discover {
                uuids,
                address,
                discovery,
            } => {
                assert_eq!(uuids, ["180f", "180a"]);
                assert_eq!(address.as_deref(), Some("C4:7C:8D:6A:2F:10"));
                assert_eq!(discovery.timeout, Some(5));
                assert!(!discovery.no_filter);
            }
            _ => panic!("expected discover"),
        }
    }

    #[test]
    fn test_write_rejects_bad_hex() {
        let result = Cli::try_parse_from(["bluebus", "write", "2a19", "xyz"]);
        assert!(result.is_err());
    }
}
