//! Lazy kernel framebuffers for allocated buffers

use std::fmt;
use tracing::{debug, warn};

use crate::buffer::ScanoutBuffer;
use crate::error::{KmsError, Result};
use crate::kms::{FRAMEBUFFER_BPP, FRAMEBUFFER_DEPTH, KmsDevice};
use crate::types::FramebufferId;

/// A kernel framebuffer plus the device needed to remove it
///
/// Dropping the handle removes the framebuffer. Handles are stored as buffer
/// metadata, so they drop when the allocator destroys the buffer.
pub struct FramebufferHandle<D: KmsDevice> {
    id: FramebufferId,
    device: D,
}

impl<D: KmsDevice> FramebufferHandle<D> {
    /// Kernel id of the framebuffer
    pub fn id(&self) -> FramebufferId {
        self.id
    }
}

impl<D: KmsDevice> fmt::Debug for FramebufferHandle<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramebufferHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl<D: KmsDevice> Drop for FramebufferHandle<D> {
    fn drop(&mut self) {
        match self.device.remove_framebuffer(self.id) {
            Ok(()) => debug!("Delete DRM FB {}", self.id.0),
            Err(e) => warn!("Failed to remove DRM FB {}: {}", self.id.0, e),
        }
    }
}

/// Return the framebuffer for `buffer`, registering one on first use
///
/// A buffer that already carries framebuffer metadata is returned unchanged
/// without touching the kernel.
pub fn get_or_create<D, B>(device: &D, buffer: &mut B) -> Result<FramebufferId>
where
    D: KmsDevice + Clone,
    B: ScanoutBuffer<D>,
{
    if let Some(existing) = buffer.framebuffer() {
        return Ok(existing.id());
    }

    let layout = buffer.layout();
    let id = device
        .add_framebuffer(&layout, FRAMEBUFFER_DEPTH, FRAMEBUFFER_BPP)
        .map_err(|e| {
            KmsError::allocation(format!(
                "Failed to create {}x{} framebuffer: {}",
                layout.width, layout.height, e
            ))
        })?;

    debug!(
        "New DRM FB ({}): {}x{}, stride {} from BO handle {}",
        id.0, layout.width, layout.height, layout.stride, layout.handle
    );

    buffer.attach_framebuffer(FramebufferHandle {
        id,
        device: device.clone(),
    });

    Ok(id)
}
