mod cli;
mod commands;
mod config;
mod format;
mod style;
mod util;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, DiscoveryArgs};
use crate::commands::*;
use crate::config::Config;
use crate::format::FormatOptions;
use crate::util::{DeviceQuery, interruptible_request, open_session, write_output};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let format = cli.format();
    let output = cli.output.as_ref();
    let opts = FormatOptions::new(cli.no_color, cli.compact);

    if let Commands::Config = cli.command {
        let path = Config::path();
        let content = format!(
            "# {}\n{}",
            path.display(),
            toml::to_string_pretty(&config)?
        );
        return write_output(output, &content);
    }

    let session = open_session(config.session_config(cli.call_timeout)).await?;
    let discovery = |uuids: &[String], args: &DiscoveryArgs| {
        interruptible_request(uuids, config.discovery_timeout(args.timeout), !args.no_filter)
    };

    let result = match &cli.command {
        Commands::Objects => cmd_objects(&session, format, output, &opts),
        Commands::Adapter => cmd_adapter(&session, format, output, &opts),
        Commands::Device { device } => {
            cmd_device(&session, &DeviceQuery::parse(device), format, output, &opts)
        }
        Commands::Discover {
            uuids,
            address,
            discovery: args,
        } => {
            cmd_discover(
                &session,
                discovery(uuids, args),
                address.as_deref(),
                format,
                output,
                cli.quiet,
                &opts,
            )
            .await
        }
        Commands::Connect {
            uuid,
            discovery: args,
        } => cmd_connect(&session, &discovery(std::slice::from_ref(uuid), args), cli.quiet).await,
        Commands::Disconnect { device } => {
            cmd_disconnect(&session, &DeviceQuery::parse_without_address(device)).await
        }
        Commands::Pair {
            uuid,
            discovery: args,
        } => cmd_pair(&session, &discovery(std::slice::from_ref(uuid), args), cli.quiet).await,
        Commands::Read { characteristic } => {
            cmd_read(&session, characteristic, format, output, &opts).await
        }
        Commands::Write {
            characteristic,
            value,
        } => cmd_write(&session, characteristic, &value.0).await,
        Commands::Notify {
            characteristic,
            count,
        } => cmd_notify(&session, characteristic, *count, format, output, &opts).await,
        Commands::Config => Ok(()),
    };

    session.close().await;
    result
}
