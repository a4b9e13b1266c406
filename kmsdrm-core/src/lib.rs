//! kmsdrm Core Library
//!
//! Direct-to-hardware display driver for full-screen accelerated rendering
//! on Linux, without a window system.
//!
//! This library provides:
//! - Discovery of KMS/DRM devices under `/dev/dri/`
//! - Connector/encoder/CRTC negotiation with save and restore of the original mode
//! - Lazy kernel framebuffers for allocated scanout buffers
//! - Page-flip presentation with vsync waits and frame dropping
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────┐    ┌──────────────────┐
//! │ Device Discovery│───▶│ Display          │───▶│ Window Surface   │
//! │ (/dev/dri/cardN)│    │ Negotiation      │    │ (GBM buffers)    │
//! └─────────────────┘    └──────────────────┘    └────────┬─────────┘
//!                                                         │
//!                        ┌──────────────────┐    ┌────────▼─────────┐
//!                        │ Page-Flip        │◀───│ Framebuffer      │
//!                        │ Scheduler        │    │ Registry         │
//!                        └──────────────────┘    └──────────────────┘
//! ```
//!
//! Kernel and allocator access goes through the [`KmsDevice`] and
//! [`BufferAllocator`] traits; [`hardware`] implements them on real devices.

pub mod buffer;
pub mod config;
pub mod device;
pub mod display;
pub mod driver;
pub mod error;
pub mod flip;
pub mod framebuffer;
pub mod hardware;
pub mod kms;
pub mod types;
pub mod window;

pub use buffer::{BufferAllocator, RenderSurface, ScanoutBuffer};
pub use config::DriverConfig;
pub use device::{DeviceBackend, DeviceContext, DeviceEnumerator, ProbeReport};
pub use display::DisplayDescriptor;
pub use driver::{InputSource, NullInput, VideoDisplay, VideoDriver, WmInfo};
pub use error::{KmsError, NegotiationError, PresentationError, Result};
pub use flip::{FlipState, PageFlipScheduler};
pub use framebuffer::FramebufferHandle;
pub use kms::{FlipTimeout, KmsDevice, KmsEvent, Readiness};
pub use types::{ConnectorId, CrtcId, DisplayMode, EncoderId, FramebufferId, ModeInfo, PixelFormat};
pub use window::{ContextSurface, GraphicsContext, PresentOutcome, WindowFlags, WindowSurface};
