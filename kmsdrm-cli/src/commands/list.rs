//! List command - candidate devices and their probe results

use anyhow::{Context, Result};
use clap::Args;
use kmsdrm_core::DriverConfig;
use kmsdrm_core::hardware::HardwareBackend;

/// Arguments for the list command
#[derive(Args)]
pub struct ListArgs {
    /// Print the probe reports as JSON
    #[arg(long)]
    pub json: bool,
}

/// Probe every `card<N>` node under the configured directory
pub fn list(config: &DriverConfig, args: ListArgs) -> Result<()> {
    let enumerator = config.enumerator();
    let reports = enumerator.probe_all(&HardwareBackend);

    if args.json {
        let json = serde_json::to_string_pretty(&reports).context("Failed to encode reports")?;
        println!("{}", json);
        return Ok(());
    }

    println!("kmsdrm - Candidate Devices in {}\n", enumerator.dir().display());

    if reports.is_empty() {
        println!("No devices found.");
        println!("\nNote: mode-setting devices are named card<N>; render nodes are not listed.");
        return Ok(());
    }

    println!(
        "{:<6} {:<24} {:<11} {:<9} {:<9} {:<6}",
        "Index", "Path", "Status", "Conns", "Encoders", "CRTCs"
    );
    println!("{}", "-".repeat(70));

    for report in &reports {
        let status = if report.available() {
            "usable"
        } else if report.opened {
            "no outputs"
        } else {
            "no access"
        };

        let (connectors, encoders, crtcs) = match report.counts {
            Some((c, e, r)) => (c.to_string(), e.to_string(), r.to_string()),
            None => ("-".to_string(), "-".to_string(), "-".to_string()),
        };

        println!(
            "{:<6} {:<24} {:<11} {:<9} {:<9} {:<6}",
            report.index,
            truncate(&report.path.display().to_string(), 22),
            status,
            connectors,
            encoders,
            crtcs
        );
    }

    if reports.iter().any(|r| !r.opened) {
        println!("\nNote: devices that could not be opened usually need membership in the 'video' group.");
    }

    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max - 3).collect();
        format!("{}...", head)
    }
}
