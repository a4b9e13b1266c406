//! Buffer-management seam
//!
//! A [`BufferAllocator`] is bound to one device and hands out
//! [`RenderSurface`]s. A surface yields locked [`ScanoutBuffer`]s; dropping a
//! locked buffer releases it back to its surface.
//!
//! Each buffer carries at most one [`FramebufferHandle`] as metadata. The
//! handle lives exactly as long as the allocator's buffer object, so the
//! kernel framebuffer goes away when the allocator destroys the buffer.

use crate::error::Result;
use crate::framebuffer::FramebufferHandle;
use crate::kms::KmsDevice;
use crate::types::{BufferLayout, BufferUsage, PixelFormat};

/// A locked buffer that can be registered as a framebuffer
pub trait ScanoutBuffer<D: KmsDevice> {
    /// Dimensions, stride and allocation handle of the buffer
    fn layout(&self) -> BufferLayout;

    /// Framebuffer metadata attached to the underlying buffer object, if any
    fn framebuffer(&self) -> Option<&FramebufferHandle<D>>;

    /// Attach framebuffer metadata to the underlying buffer object
    fn attach_framebuffer(&mut self, framebuffer: FramebufferHandle<D>);
}

/// A rendering surface whose front buffer can be locked for scanout
pub trait RenderSurface<D: KmsDevice> {
    type Buffer: ScanoutBuffer<D>;

    /// Lock the buffer most recently rendered to
    fn lock_front_buffer(&mut self) -> Result<Self::Buffer>;

    /// Whether the surface can still hand out a buffer to render into
    fn has_free_buffers(&self) -> bool;
}

/// A device-bound buffer allocator
pub trait BufferAllocator<D: KmsDevice> {
    type Surface: RenderSurface<D>;

    /// Whether buffers of `format` can be allocated with `usage`
    fn is_format_supported(&self, format: PixelFormat, usage: BufferUsage) -> bool;

    /// Create a rendering surface of the given size
    fn create_surface(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: BufferUsage,
    ) -> Result<Self::Surface>;
}
