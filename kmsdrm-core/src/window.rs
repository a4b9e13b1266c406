//! The single full-screen window and its buffer rotation
//!
//! A window owns a rendering surface sized to the negotiated mode, the buffer
//! currently on screen and the buffer queued to replace it. Buffers are only
//! released once no flip can still reference them.

use bitflags::bitflags;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::buffer::{BufferAllocator, RenderSurface};
use crate::config::DriverConfig;
use crate::display::DisplayDescriptor;
use crate::error::{KmsError, Result};
use crate::flip::{FlipState, PageFlipScheduler};
use crate::framebuffer;
use crate::kms::{FlipTimeout, KmsDevice};
use crate::types::{BufferUsage, ConnectorId, ModeInfo, PixelFormat};

/// Format of the scanout surface
pub const SURFACE_FORMAT: PixelFormat = PixelFormat::Xrgb8888;

bitflags! {
    /// Window state flags as seen by the host
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WindowFlags: u32 {
        const FULLSCREEN = 1 << 0;
        const OPENGL = 1 << 1;
        const SHOWN = 1 << 2;
        const INPUT_FOCUS = 1 << 9;
        const MOUSE_FOCUS = 1 << 10;
    }
}

/// A graphics-context surface bound to a rendering surface
///
/// Dropping it releases the context surface.
pub trait ContextSurface {
    /// Finish the frame so the rendering surface has a new front buffer
    fn swap_buffers(&mut self) -> Result<()>;
}

/// An accelerated rendering context that can render into native windows
pub trait GraphicsContext<N> {
    type Surface: ContextSurface;

    /// Create a context surface for `native_window`, rendering in `format`
    fn create_surface(&mut self, native_window: &N, format: PixelFormat) -> Result<Self::Surface>;
}

/// Context surface used when no graphics context is bound
#[derive(Debug, Default)]
pub struct NoContextSurface;

impl ContextSurface for NoContextSurface {
    fn swap_buffers(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Graphics context for hosts that render into the surface some other way
#[derive(Debug, Default, Clone, Copy)]
pub struct NoContext;

impl<N> GraphicsContext<N> for NoContext {
    type Surface = NoContextSurface;

    fn create_surface(&mut self, _native_window: &N, _format: PixelFormat) -> Result<Self::Surface> {
        Ok(NoContextSurface)
    }
}

/// What a presentation request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// First frame: the CRTC was programmed with the new buffer
    Modeset,
    /// A page flip to the new buffer was queued
    Flipped,
    /// The previous flip had not completed; nothing was presented
    Dropped,
}

/// The rendering surface of a window and its current/next buffers
///
/// `next` is the buffer the CRTC shows (or is flipping to); `current` is the
/// one it showed before that. Dropping the window waits for any pending flip,
/// then releases the buffers, the context surface and the rendering surface,
/// in that order.
pub struct WindowSurface<D, S, G>
where
    D: KmsDevice + Clone,
    S: RenderSurface<D>,
    G: ContextSurface,
{
    next: Option<S::Buffer>,
    current: Option<S::Buffer>,
    context_surface: Option<G>,
    surface: S,
    device: D,
    flips: PageFlipScheduler,
    connector: ConnectorId,
    mode: ModeInfo,
    flags: WindowFlags,
    double_buffer: bool,
    swap_interval: u32,
    lease: Option<Arc<()>>,
}

impl<D, S, G> WindowSurface<D, S, G>
where
    D: KmsDevice + Clone,
    S: RenderSurface<D>,
    G: ContextSurface,
{
    /// Create the window for `display` on `device`
    ///
    /// The window always covers the whole display mode and is always
    /// full-screen and accelerated. If `context` is given, a context surface
    /// is bound to the rendering surface; failing to bind one fails creation.
    pub fn create<A, C>(
        device: &D,
        allocator: &A,
        display: &DisplayDescriptor,
        requested: WindowFlags,
        config: &DriverConfig,
        context: Option<&mut C>,
    ) -> Result<Self>
    where
        A: BufferAllocator<D, Surface = S>,
        C: GraphicsContext<S, Surface = G>,
    {
        let mode = display.mode().clone();
        let (width, height) = mode.size();
        let usage = BufferUsage::SCANOUT | BufferUsage::RENDERING;

        if config.check_format && !allocator.is_format_supported(SURFACE_FORMAT, usage) {
            warn!("GBM surface format not supported. Trying anyway.");
        }

        let surface = allocator.create_surface(width, height, SURFACE_FORMAT, usage)?;

        // On failure `surface` drops here and is destroyed.
        let context_surface = match context {
            Some(context) => Some(context.create_surface(&surface, SURFACE_FORMAT).map_err(
                |e| KmsError::surface_creation(format!("Could not create EGL window surface: {}", e)),
            )?),
            None => None,
        };

        // One window, it always has focus.
        let flags = requested
            | WindowFlags::FULLSCREEN
            | WindowFlags::OPENGL
            | WindowFlags::INPUT_FOCUS
            | WindowFlags::MOUSE_FOCUS;

        let crtc = display.crtc();
        let connector_name = display.connector_name();
        info!(
            "Created {}x{} window on {} ({})",
            width, height, crtc, connector_name
        );

        Ok(Self {
            next: None,
            current: None,
            context_surface,
            surface,
            device: device.clone(),
            flips: PageFlipScheduler::new(crtc),
            connector: display.connector(),
            mode,
            flags,
            double_buffer: config.double_buffer,
            swap_interval: 1,
            lease: None,
        })
    }

    /// Tie the window to a live-window count held by its owner
    pub(crate) fn with_lease(mut self, lease: Arc<()>) -> Self {
        self.lease = Some(lease);
        self
    }

    /// Window size, always the display mode size
    pub fn size(&self) -> (u32, u32) {
        self.mode.size()
    }

    /// Window flags
    pub fn flags(&self) -> WindowFlags {
        self.flags
    }

    /// Whether the window waits for each flip right after queueing it
    pub fn double_buffer(&self) -> bool {
        self.double_buffer
    }

    /// Flip state of the window
    pub fn flip_state(&self) -> FlipState {
        self.flips.state()
    }

    /// The native rendering surface, for binding a graphics context
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// The bound context surface, if any
    pub fn context_surface(&self) -> Option<&G> {
        self.context_surface.as_ref()
    }

    /// Swap interval: 1 waits for the previous flip, 0 drops frames instead
    pub fn swap_interval(&self) -> u32 {
        self.swap_interval
    }

    /// Set the swap interval; only 0 and 1 are supported
    pub fn set_swap_interval(&mut self, interval: u32) -> Result<()> {
        if interval > 1 {
            return Err(KmsError::Unsupported(format!(
                "swap interval {} (only 0 and 1)",
                interval
            )));
        }
        self.swap_interval = interval;
        Ok(())
    }

    /// Block until the outstanding flip completes
    pub fn wait_for_flip(&mut self, timeout: FlipTimeout) -> Result<()> {
        self.flips.wait(&self.device, timeout)
    }

    /// Present the most recently rendered frame
    ///
    /// The first frame programs the CRTC directly; later frames queue a page
    /// flip. If the previous flip has not completed the frame is dropped and
    /// the window stays usable. A buffer only becomes `next` once the kernel
    /// has accepted it, so a rejected modeset or flip leaves the buffer on
    /// screen untouched.
    pub fn present(&mut self) -> Result<PresentOutcome> {
        let timeout = if self.swap_interval == 0 {
            FlipTimeout::Immediate
        } else {
            FlipTimeout::Infinite
        };

        match self.flips.wait(&self.device, timeout) {
            Ok(()) => {}
            Err(KmsError::Presentation(e)) => {
                trace!("Not presenting: {}", e);
                return Ok(PresentOutcome::Dropped);
            }
            Err(e) => return Err(e),
        }

        // No flip is outstanding, so only `next` can still be on screen.
        self.current = None;

        if let Some(context_surface) = self.context_surface.as_mut() {
            context_surface.swap_buffers()?;
        }

        let mut buffer = self.surface.lock_front_buffer()?;
        let fb = framebuffer::get_or_create(&self.device, &mut buffer)?;

        let outcome = if self.next.is_none() {
            self.device
                .set_crtc(
                    self.flips.crtc(),
                    Some(fb),
                    (0, 0),
                    &[self.connector],
                    Some(&self.mode),
                )
                .map_err(|e| KmsError::Io(e).with_context("Could not set up initial buffer"))?;
            debug!("Initial modeset on {} with fb {}", self.flips.crtc(), fb.0);
            PresentOutcome::Modeset
        } else {
            self.flips.submit(&self.device, fb)?;
            PresentOutcome::Flipped
        };

        // Scanned out until the flip to `buffer` lands.
        self.current = self.next.replace(buffer);

        // Low-latency mode: wait for vsync right away, as if there were only two buffers.
        if self.double_buffer {
            if let Err(e) = self.flips.wait(&self.device, FlipTimeout::Infinite) {
                debug!("Double-buffered flip wait failed: {}", e);
            }
        }

        Ok(outcome)
    }

    // There is no window manager: decoration, placement and stacking requests
    // are accepted and ignored.

    pub fn set_title(&mut self, title: &str) {
        trace!("set_title({:?}) ignored", title);
    }

    pub fn set_icon(&mut self) {
        trace!("set_icon ignored");
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        trace!("set_position({}, {}) ignored", x, y);
    }

    pub fn set_size(&mut self, width: u32, height: u32) {
        trace!("set_size({}x{}) ignored, window is {:?}", width, height, self.size());
    }

    pub fn show(&mut self) {
        trace!("show ignored");
    }

    pub fn hide(&mut self) {
        trace!("hide ignored");
    }

    pub fn raise(&mut self) {
        trace!("raise ignored");
    }

    pub fn maximize(&mut self) {
        trace!("maximize ignored");
    }

    pub fn minimize(&mut self) {
        trace!("minimize ignored");
    }

    pub fn restore(&mut self) {
        trace!("restore ignored");
    }

    pub fn set_grab(&mut self, grabbed: bool) {
        trace!("set_grab({}) ignored", grabbed);
    }

    /// Tear the window down
    ///
    /// Same as dropping it: waits without a timeout for any outstanding flip,
    /// then releases the current and next buffers, the context surface and
    /// the rendering surface, in that order.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<D, S, G> Drop for WindowSurface<D, S, G>
where
    D: KmsDevice + Clone,
    S: RenderSurface<D>,
    G: ContextSurface,
{
    fn drop(&mut self) {
        if let Err(e) = self.flips.wait(&self.device, FlipTimeout::Infinite) {
            warn!("Pending flip did not complete before window teardown: {}", e);
        }

        drop(self.current.take());
        drop(self.next.take());
        drop(self.context_surface.take());
        debug!("Window destroyed");
        // `surface` drops after this, then the device handle.
    }
}
