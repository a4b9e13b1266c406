//! Display device discovery and ownership
//!
//! Candidate devices live in a fixed directory and are named by a fixed
//! prefix plus a numeric index (`/dev/dri/card0`, `/dev/dri/card1`, ...).
//! A candidate is usable only if it reports at least one connector, one
//! encoder and one CRTC.

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::buffer::BufferAllocator;
use crate::error::{KmsError, Result};
use crate::kms::KmsDevice;

/// Directory holding DRM device nodes
pub const DRI_PATH: &str = "/dev/dri/";

/// Name prefix of primary (mode-setting) device nodes
pub const CARD_PREFIX: &str = "card";

/// Opens devices and creates the buffer allocators bound to them
pub trait DeviceBackend {
    type Device: KmsDevice + Clone;
    type Allocator: BufferAllocator<Self::Device>;

    /// Open a device node read-write, close-on-exec
    fn open(&self, path: &Path) -> io::Result<Self::Device>;

    /// Create a buffer allocator bound to an open device
    fn create_allocator(&self, device: &Self::Device) -> Result<Self::Allocator>;
}

/// Device-wide state owned by one driver instance
///
/// Dropping the context releases the allocator and then closes the device.
pub struct DeviceContext<B: DeviceBackend> {
    allocator: B::Allocator,
    device: B::Device,
    index: u32,
    path: PathBuf,
}

impl<B: DeviceBackend> DeviceContext<B> {
    /// Open device `index` and bind an allocator to it
    pub fn open(backend: &B, enumerator: &DeviceEnumerator, index: u32) -> Result<Self> {
        let path = enumerator.device_path(index);
        debug!("Opening device {}", path.display());

        let device = backend.open(&path).map_err(|e| {
            KmsError::Io(e).with_context(format!("Could not open {}", path.display()))
        })?;
        // On failure `device` drops here, closing the descriptor.
        let allocator = backend.create_allocator(&device)?;

        debug!("Opened DRM device {}", path.display());
        Ok(Self {
            allocator,
            device,
            index,
            path,
        })
    }

    /// The open mode-setting device
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// The allocator bound to the device
    pub fn allocator(&self) -> &B::Allocator {
        &self.allocator
    }

    /// Index of the device node
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Path of the device node
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of probing one candidate device
#[derive(Debug, Clone, Serialize)]
pub struct ProbeReport {
    pub index: u32,
    pub path: PathBuf,
    /// Whether the device node could be opened
    pub opened: bool,
    /// Connector, encoder and CRTC counts, if the resource query succeeded
    pub counts: Option<(usize, usize, usize)>,
}

impl ProbeReport {
    /// Usable for mode-setting
    pub fn available(&self) -> bool {
        matches!(self.counts, Some((c, e, r)) if c > 0 && e > 0 && r > 0)
    }
}

/// Finds and probes candidate display devices
#[derive(Debug, Clone)]
pub struct DeviceEnumerator {
    dir: PathBuf,
    prefix: String,
}

impl Default for DeviceEnumerator {
    fn default() -> Self {
        Self::new(DRI_PATH, CARD_PREFIX)
    }
}

impl DeviceEnumerator {
    /// Enumerate `<dir>/<prefix><N>` device nodes
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    /// Directory being scanned
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of candidate `index`
    pub fn device_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, index))
    }

    fn is_candidate_name(&self, name: &str) -> bool {
        name.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Count directory entries named `<prefix><N>`
    pub fn count_candidates(&self) -> u32 {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("The path {} cannot be opened: {}", self.dir.display(), e);
                return 0;
            }
        };

        let count = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| self.is_candidate_name(name))
            })
            .count();

        trace!("{} candidate devices in {}", count, self.dir.display());
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Open candidate `index` and report its mode-setting resources
    ///
    /// The device is closed again before this returns.
    pub fn probe_report<B: DeviceBackend>(&self, backend: &B, index: u32) -> ProbeReport {
        let path = self.device_path(index);
        let mut report = ProbeReport {
            index,
            path: path.clone(),
            opened: false,
            counts: None,
        };

        let device = match backend.open(&path) {
            Ok(device) => device,
            Err(e) => {
                trace!("Could not open {}: {}", path.display(), e);
                return report;
            }
        };
        report.opened = true;

        match device.resources() {
            Ok(res) => {
                debug!(
                    "{} connector, encoder and CRTC counts are: {} {} {}",
                    path.display(),
                    res.connectors.len(),
                    res.encoders.len(),
                    res.crtcs.len()
                );
                report.counts = Some((res.connectors.len(), res.encoders.len(), res.crtcs.len()));
            }
            Err(e) => debug!("{}: resource query failed: {}", path.display(), e),
        }

        report
    }

    /// Whether candidate `index` is usable for mode-setting
    pub fn probe<B: DeviceBackend>(&self, backend: &B, index: u32) -> bool {
        self.probe_report(backend, index).available()
    }

    /// Probe every candidate in index order
    pub fn probe_all<B: DeviceBackend>(&self, backend: &B) -> Vec<ProbeReport> {
        (0..self.count_candidates())
            .map(|index| self.probe_report(backend, index))
            .collect()
    }

    /// The lowest candidate index that probes as usable
    pub fn select_default<B: DeviceBackend>(&self, backend: &B) -> Result<u32> {
        (0..self.count_candidates())
            .find(|&index| self.probe(backend, index))
            .ok_or(KmsError::DeviceUnavailable)
    }
}
