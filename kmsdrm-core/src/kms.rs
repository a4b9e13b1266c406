//! Kernel mode-setting seam
//!
//! [`KmsDevice`] is the set of mode-setting queries and mutations the driver
//! performs on an open device descriptor. The hardware implementation lives in
//! [`crate::hardware`]; tests drive the driver through scripted fakes.

use bitflags::bitflags;
use std::io;
use std::time::Duration;

use crate::types::{
    BufferLayout, ConnectorId, ConnectorInfo, CrtcId, CrtcState, EncoderId, EncoderInfo,
    FramebufferId, ModeInfo, ResourceList,
};

/// Color depth used when registering framebuffers
pub const FRAMEBUFFER_DEPTH: u32 = 24;

/// Bits per pixel used when registering framebuffers
pub const FRAMEBUFFER_BPP: u32 = 32;

bitflags! {
    /// Readiness reported by polling the device descriptor
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Readiness: u8 {
        /// Kernel events are waiting to be read
        const READABLE = 1 << 0;
        /// The device hung up
        const HANGUP = 1 << 1;
        /// The descriptor is in an error state
        const ERROR = 1 << 2;
    }
}

/// How long a flip wait may block in a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipTimeout {
    /// Do not block at all
    Immediate,
    /// Block for at most this many milliseconds
    Millis(u32),
    /// Block until something happens
    Infinite,
}

impl FlipTimeout {
    /// Interpret a poll(2)-style timeout: negative blocks forever, zero never blocks
    pub fn from_millis(ms: i32) -> Self {
        match ms {
            ms if ms < 0 => Self::Infinite,
            0 => Self::Immediate,
            ms => Self::Millis(ms.unsigned_abs()),
        }
    }

    /// The timeout argument to pass to poll(2)
    pub fn as_poll_timeout(&self) -> i32 {
        match self {
            Self::Immediate => 0,
            Self::Millis(ms) => i32::try_from(*ms).unwrap_or(i32::MAX),
            Self::Infinite => -1,
        }
    }
}

impl From<Duration> for FlipTimeout {
    fn from(duration: Duration) -> Self {
        match u32::try_from(duration.as_millis()) {
            Ok(0) => Self::Immediate,
            Ok(ms) => Self::Millis(ms),
            Err(_) => Self::Infinite,
        }
    }
}

/// An event read back from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KmsEvent {
    /// A page flip submitted on `crtc` has completed
    FlipComplete {
        crtc: CrtcId,
        frame: u32,
        /// Timestamp of the vblank the flip landed on
        time: Duration,
    },
    /// A vblank occurred on `crtc`
    Vblank { crtc: CrtcId, frame: u32 },
    /// Anything else the kernel delivered
    Other,
}

/// Mode-setting operations on an open device
///
/// Queries return owned snapshots; there is nothing to free afterwards.
pub trait KmsDevice {
    /// Query the device's connector/encoder/CRTC lists
    fn resources(&self) -> io::Result<ResourceList>;

    /// Query a connector
    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo>;

    /// Query an encoder
    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo>;

    /// Query the current configuration of a CRTC
    fn crtc(&self, id: CrtcId) -> io::Result<CrtcState>;

    /// Program a CRTC
    fn set_crtc(
        &self,
        crtc: CrtcId,
        framebuffer: Option<FramebufferId>,
        position: (u32, u32),
        connectors: &[ConnectorId],
        mode: Option<&ModeInfo>,
    ) -> io::Result<()>;

    /// Register a buffer with the kernel as a framebuffer
    fn add_framebuffer(
        &self,
        layout: &BufferLayout,
        depth: u32,
        bpp: u32,
    ) -> io::Result<FramebufferId>;

    /// Remove a framebuffer registered with [`KmsDevice::add_framebuffer`]
    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> io::Result<()>;

    /// Queue a vsync-synchronised flip to `framebuffer`, requesting a completion event
    fn page_flip(&self, crtc: CrtcId, framebuffer: FramebufferId) -> io::Result<()>;

    /// Block until the descriptor is readable, hangs up, or the timeout expires
    fn poll(&self, timeout: FlipTimeout) -> io::Result<Readiness>;

    /// Read and decode pending events
    fn receive_events(&self) -> io::Result<Vec<KmsEvent>>;
}
