//! Config command - inspect configuration (read-only)

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use kmsdrm_core::DriverConfig;
use kmsdrm_core::config::{HINT_DEVICE_DIR, HINT_DEVICE_INDEX, HINT_DOUBLE_BUFFER, sample_config};
use std::path::Path;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the config file
    Path,

    /// Show the effective configuration (file plus environment hints)
    Show,

    /// Print a sample configuration to stdout
    Sample,
}

/// Run config subcommand
pub fn config(effective: &DriverConfig, file: Option<&Path>, args: ConfigArgs) -> Result<()> {
    let path = file
        .map(Path::to_path_buf)
        .unwrap_or_else(DriverConfig::default_path);

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            if path.exists() {
                println!("(file exists)");
            } else {
                println!("(file does not exist)");
            }
        }
        ConfigCommand::Show => {
            if path.exists() {
                println!("# Configuration file: {}", path.display());
            } else {
                println!("# No configuration file at {}, using defaults", path.display());
            }
            println!(
                "# Environment hints: {}, {}, {}\n",
                HINT_DOUBLE_BUFFER, HINT_DEVICE_INDEX, HINT_DEVICE_DIR
            );

            let content =
                toml::to_string_pretty(effective).context("Failed to encode configuration")?;
            print!("{}", content);
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
