//! Real hardware: DRM device nodes and GBM allocation
//!
//! ```ignore
//! use kmsdrm_core::{DriverConfig, VideoDriver, hardware::HardwareBackend};
//!
//! let mut driver = VideoDriver::from_config(HardwareBackend, DriverConfig::from_env())?;
//! driver.init()?;
//! ```

mod allocator;
mod card;

pub use card::Card;
pub use allocator::{GbmAllocator, GbmBuffer, GbmSurface};

use std::io;
use std::path::Path;

use crate::device::DeviceBackend;
use crate::error::Result;

/// Backend for `/dev/dri` nodes
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareBackend;

impl DeviceBackend for HardwareBackend {
    type Device = Card;
    type Allocator = GbmAllocator;

    fn open(&self, path: &Path) -> io::Result<Card> {
        Card::open(path)
    }

    fn create_allocator(&self, device: &Card) -> Result<GbmAllocator> {
        GbmAllocator::new(device.clone())
    }
}
