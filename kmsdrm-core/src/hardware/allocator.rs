//! GBM buffer allocation on an open [`Card`]

use gbm::{BufferObject, BufferObjectFlags, Format};
use std::fmt;
use tracing::debug;

use super::card::Card;
use crate::buffer::{BufferAllocator, RenderSurface, ScanoutBuffer};
use crate::error::{KmsError, Result};
use crate::framebuffer::FramebufferHandle;
use crate::types::{BufferLayout, BufferUsage, PixelFormat};

/// A locked GBM buffer object carrying its framebuffer as user data
pub type GbmBuffer = BufferObject<FramebufferHandle<Card>>;

fn gbm_format(format: PixelFormat) -> Format {
    match format {
        PixelFormat::Xrgb8888 => Format::Xrgb8888,
        PixelFormat::Argb8888 => Format::Argb8888,
    }
}

fn gbm_flags(usage: BufferUsage) -> BufferObjectFlags {
    let mut flags = BufferObjectFlags::empty();
    if usage.contains(BufferUsage::SCANOUT) {
        flags |= BufferObjectFlags::SCANOUT;
    }
    if usage.contains(BufferUsage::RENDERING) {
        flags |= BufferObjectFlags::RENDERING;
    }
    flags
}

/// GBM device bound to one card
pub struct GbmAllocator {
    device: gbm::Device<Card>,
}

impl GbmAllocator {
    pub fn new(card: Card) -> Result<Self> {
        let device = gbm::Device::new(card)
            .map_err(|e| KmsError::allocation(format!("Couldn't create gbm device: {}", e)))?;
        debug!("Created GBM device ({})", device.backend_name());
        Ok(Self { device })
    }

    /// The underlying GBM device, for graphics-context setup
    pub fn gbm_device(&self) -> &gbm::Device<Card> {
        &self.device
    }
}

impl fmt::Debug for GbmAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GbmAllocator")
            .field("backend", &self.device.backend_name())
            .finish()
    }
}

impl BufferAllocator<Card> for GbmAllocator {
    type Surface = GbmSurface;

    fn is_format_supported(&self, format: PixelFormat, usage: BufferUsage) -> bool {
        self.device
            .is_format_supported(gbm_format(format), gbm_flags(usage))
    }

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: BufferUsage,
    ) -> Result<GbmSurface> {
        let surface = self
            .device
            .create_surface::<FramebufferHandle<Card>>(
                width,
                height,
                gbm_format(format),
                gbm_flags(usage),
            )
            .map_err(|e| KmsError::surface_creation(format!("Could not create GBM surface: {}", e)))?;
        debug!("Created {}x{} GBM surface ({})", width, height, format);
        Ok(GbmSurface(surface))
    }
}

/// A GBM surface the graphics context renders into
pub struct GbmSurface(gbm::Surface<FramebufferHandle<Card>>);

impl GbmSurface {
    /// The underlying GBM surface, the native window for EGL
    pub fn inner(&self) -> &gbm::Surface<FramebufferHandle<Card>> {
        &self.0
    }
}

impl RenderSurface<Card> for GbmSurface {
    type Buffer = GbmBuffer;

    fn lock_front_buffer(&mut self) -> Result<GbmBuffer> {
        // SAFETY: only called after the context surface swapped, so a front buffer exists.
        unsafe { self.0.lock_front_buffer() }
            .map_err(|e| KmsError::allocation(format!("Could not lock GBM surface front buffer: {}", e)))
    }

    fn has_free_buffers(&self) -> bool {
        self.0.has_free_buffers()
    }
}

impl ScanoutBuffer<Card> for GbmBuffer {
    fn layout(&self) -> BufferLayout {
        BufferLayout {
            width: self.width(),
            height: self.height(),
            stride: self.stride(),
            // SAFETY: every member of the handle union is a view of the same bits.
            handle: unsafe { self.handle().u32_ },
        }
    }

    fn framebuffer(&self) -> Option<&FramebufferHandle<Card>> {
        self.userdata()
    }

    fn attach_framebuffer(&mut self, framebuffer: FramebufferHandle<Card>) {
        self.set_userdata(framebuffer);
    }
}
