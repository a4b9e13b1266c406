//! Info command - negotiate a display and report it

use anyhow::Result;
use clap::Args;
use kmsdrm_core::hardware::HardwareBackend;
use kmsdrm_core::types::{CrtcState, DisplayMode};
use kmsdrm_core::{DriverConfig, KmsError, VideoDriver};
use serde::Serialize;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Device index to open (0 selects the first usable device)
    #[arg(short, long)]
    pub device: Option<u32>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// What negotiation settled on
#[derive(Serialize)]
struct DisplayReport {
    device_index: u32,
    device_path: String,
    connector: u32,
    connector_name: String,
    crtc: u32,
    mode: DisplayMode,
    mode_name: String,
    saved_crtc: Option<CrtcState>,
}

/// Initialize the driver, print the negotiated display, then quit
pub fn info(mut config: DriverConfig, args: InfoArgs) -> Result<()> {
    if args.device.is_some() {
        config.device_index = args.device;
    }

    let report = match negotiate(config) {
        Ok(report) => report,
        Err(e) => {
            if let Some(hint) = e.user_hint() {
                eprintln!("Hint: {}", hint);
            }
            return Err(e.into());
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("kmsdrm - Display Information\n");

    println!("Device:");
    println!("  Index:     {}", report.device_index);
    println!("  Path:      {}", report.device_path);
    println!();

    println!("Output:");
    println!("  Connector: {} (id {})", report.connector_name, report.connector);
    println!("  CRTC:      {}", report.crtc);
    println!(
        "  Mode:      {}x{} @ {}Hz ({})",
        report.mode.width, report.mode.height, report.mode.refresh_rate, report.mode_name
    );
    println!("  Format:    {}", report.mode.format);
    println!();

    println!("Saved CRTC (restored on exit):");
    match &report.saved_crtc {
        Some(saved) => {
            let fb = saved
                .framebuffer
                .map(|fb| fb.to_string())
                .unwrap_or_else(|| "none".to_string());
            let mode = saved
                .mode
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "invalid".to_string());
            println!("  Framebuffer: {}", fb);
            println!("  Position:    ({}, {})", saved.position.0, saved.position.1);
            println!("  Mode:        {}", mode);
        }
        None => println!("  (nothing saved)"),
    }

    Ok(())
}

fn negotiate(config: DriverConfig) -> Result<DisplayReport, KmsError> {
    let path = |index| config.enumerator().device_path(index);
    let mut driver = VideoDriver::from_config(HardwareBackend, config.clone())?;
    driver.init()?;

    let index = driver.device_index();
    let display = driver.display().ok_or(KmsError::NotInitialized)?;
    let descriptor = display.descriptor();

    let report = DisplayReport {
        device_index: index,
        device_path: path(index).display().to_string(),
        connector: descriptor.connector().as_u32(),
        connector_name: descriptor.connector_name().to_string(),
        crtc: descriptor.crtc().as_u32(),
        mode: display.current_mode(),
        mode_name: descriptor.mode().name.clone(),
        saved_crtc: descriptor.saved_crtc().cloned(),
    };

    driver.quit();
    Ok(report)
}
