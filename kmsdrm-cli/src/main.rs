//! kmsdrm CLI
//!
//! Inspect and probe KMS/DRM display devices from a bare console.
//!
//! # Usage
//!
//! ```bash
//! # List candidate devices and whether they can drive a display
//! kmsdrm list
//!
//! # Negotiate a display on the default device and print it
//! kmsdrm info
//!
//! # Print the effective configuration
//! kmsdrm config show
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kmsdrm_core::DriverConfig;
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// kmsdrm - direct-to-hardware display driver tools
#[derive(Parser)]
#[command(name = "kmsdrm")]
#[command(version)]
#[command(about = "Inspect and probe KMS/DRM display devices", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Read settings from this file instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidate devices and their mode-setting resources
    #[command(alias = "ls")]
    List(commands::ListArgs),

    /// Negotiate a display and show what was found
    Info(commands::InfoArgs),

    /// Show configuration
    Config(commands::ConfigArgs),
}

fn load_config(path: Option<&PathBuf>) -> Result<DriverConfig> {
    let config = match path {
        Some(path) => DriverConfig::load_from(path)?,
        None => DriverConfig::load_or_default(),
    };
    Ok(config.with_env_overrides())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(format!("kmsdrm={}", level).parse()?),
        )
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::List(args) => commands::list(&config, args)?,
        Commands::Info(args) => commands::info(config, args)?,
        Commands::Config(args) => commands::config(&config, cli.config.as_deref(), args)?,
    }

    Ok(())
}
