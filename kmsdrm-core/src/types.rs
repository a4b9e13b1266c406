//! Core types for kmsdrm
//!
//! Plain snapshots of kernel mode-setting objects. The kernel owns the
//! real objects; these values are what a query returned at one moment.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Get the raw kernel object id
            pub fn as_u32(&self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> u32 {
                id.0
            }
        }
    };
}

resource_id!(
    /// Kernel id of a connector (physical output port)
    ConnectorId,
    "connector"
);
resource_id!(
    /// Kernel id of an encoder
    EncoderId,
    "encoder"
);
resource_id!(
    /// Kernel id of a CRTC (scanout pipeline)
    CrtcId,
    "crtc"
);
resource_id!(
    /// Kernel id of a framebuffer object
    FramebufferId,
    "fb"
);

/// A display timing, mirroring the kernel's mode-info record
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModeInfo {
    /// Pixel clock in kHz
    pub clock: u32,
    pub hdisplay: u16,
    pub hsync_start: u16,
    pub hsync_end: u16,
    pub htotal: u16,
    pub hskew: u16,
    pub vdisplay: u16,
    pub vsync_start: u16,
    pub vsync_end: u16,
    pub vtotal: u16,
    pub vscan: u16,
    /// Vertical refresh in Hz
    pub vrefresh: u32,
    pub flags: u32,
    pub mode_type: u32,
    pub name: String,
}

impl ModeInfo {
    /// Build a mode with just the visible geometry and refresh filled in
    pub fn new(hdisplay: u16, vdisplay: u16, vrefresh: u32) -> Self {
        Self {
            hdisplay,
            vdisplay,
            vrefresh,
            name: format!("{}x{}", hdisplay, vdisplay),
            ..Self::default()
        }
    }

    /// Visible size in pixels
    pub fn size(&self) -> (u32, u32) {
        (u32::from(self.hdisplay), u32::from(self.vdisplay))
    }
}

impl fmt::Display for ModeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}Hz", self.hdisplay, self.vdisplay, self.vrefresh)
    }
}

/// Connector connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Unknown,
}

/// Snapshot of a connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub id: ConnectorId,
    /// Human-readable name such as "HDMI-A-1"
    pub name: String,
    pub state: ConnectionState,
    /// Advertised modes, in the order the kernel listed them
    pub modes: Vec<ModeInfo>,
    /// Encoders this connector can be driven by
    pub encoders: Vec<EncoderId>,
    /// Encoder currently assigned to the connector
    pub current_encoder: Option<EncoderId>,
}

impl ConnectorInfo {
    /// Connected with at least one mode
    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Connected && !self.modes.is_empty()
    }
}

/// Snapshot of an encoder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderInfo {
    pub id: EncoderId,
    /// CRTC currently feeding this encoder
    pub crtc: Option<CrtcId>,
    /// Bit `i` is set if the `i`-th CRTC of the resource list can feed this encoder
    pub possible_crtcs: u32,
}

impl EncoderInfo {
    /// Whether the CRTC at `index` in the resource list can feed this encoder
    pub fn can_use_crtc_index(&self, index: usize) -> bool {
        index < 32 && self.possible_crtcs & (1 << index) != 0
    }
}

/// Snapshot of a CRTC configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrtcState {
    pub id: CrtcId,
    /// Framebuffer being scanned out, if any
    pub framebuffer: Option<FramebufferId>,
    /// Scanout offset into the framebuffer
    pub position: (u32, u32),
    /// Programmed mode; `None` when the kernel reports the mode as invalid
    pub mode: Option<ModeInfo>,
}

/// The mode-setting resource list of a device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    pub connectors: Vec<ConnectorId>,
    pub encoders: Vec<EncoderId>,
    pub crtcs: Vec<CrtcId>,
}

impl ResourceList {
    /// A device is only usable for mode-setting with at least one of each
    pub fn is_usable(&self) -> bool {
        !self.connectors.is_empty() && !self.encoders.is_empty() && !self.crtcs.is_empty()
    }
}

/// Memory layout of an allocated buffer, as needed to register a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLayout {
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: u32,
    /// Allocation handle local to the device
    pub handle: u32,
}

/// Pixel formats the driver asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 32-bit RGB with an unused alpha byte, the scanout surface format
    #[default]
    Xrgb8888,
    /// 32-bit ARGB, the format reported for the display mode
    Argb8888,
}

impl PixelFormat {
    /// DRM fourcc code of this format
    pub fn fourcc(&self) -> u32 {
        match self {
            Self::Xrgb8888 => u32::from_le_bytes(*b"XR24"),
            Self::Argb8888 => u32::from_le_bytes(*b"AR24"),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xrgb8888 => write!(f, "XRGB8888"),
            Self::Argb8888 => write!(f, "ARGB8888"),
        }
    }
}

bitflags! {
    /// How an allocated buffer will be used
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be scanned out by a CRTC
        const SCANOUT = 1 << 0;
        /// Buffer can be rendered into by the GPU
        const RENDERING = 1 << 2;
    }
}

/// A display mode as exposed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayMode {
    pub width: u32,
    pub height: u32,
    /// Refresh rate in Hz
    pub refresh_rate: u32,
    pub format: PixelFormat,
}

impl From<&ModeInfo> for DisplayMode {
    fn from(mode: &ModeInfo) -> Self {
        let (width, height) = mode.size();
        Self {
            width,
            height,
            refresh_rate: mode.vrefresh,
            format: PixelFormat::Argb8888,
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {}Hz ({})",
            self.width, self.height, self.refresh_rate, self.format
        )
    }
}
