//! Host-facing video driver
//!
//! [`VideoDriver`] is what a host multimedia framework talks to: it selects a
//! device, initializes it, exposes the single display mode, creates and
//! destroys the window, and restores the display on quit.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::buffer::BufferAllocator;
use crate::config::DriverConfig;
use crate::device::{DeviceBackend, DeviceContext, DeviceEnumerator};
use crate::display::{self, DisplayDescriptor};
use crate::error::{KmsError, Result};
use crate::types::DisplayMode;
use crate::window::{GraphicsContext, NoContext, PresentOutcome, WindowFlags, WindowSurface};

/// Major version of the window-manager info interface
pub const WM_INFO_MAJOR_VERSION: u32 = 2;

/// Highest device index a host may request explicitly
pub const MAX_DEVICE_INDEX: u32 = 99;

/// Name of the driver as reported to hosts
pub const DRIVER_NAME: &str = "KMSDRM";

/// Keyboard and pointer input, handled outside the driver
pub trait InputSource {
    /// Start delivering input; called once the display is up
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Process pending input events
    fn pump(&mut self);

    /// Stop delivering input; called before the display is restored
    fn quit(&mut self) {}
}

/// Input source that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NullInput;

impl InputSource for NullInput {
    fn pump(&mut self) {}
}

/// Rendering surface type of a backend
pub type BackendSurface<B> = <<B as DeviceBackend>::Allocator as BufferAllocator<
    <B as DeviceBackend>::Device,
>>::Surface;

/// Window type created by a driver on backend `B` with graphics context `C`
pub type DriverWindow<B, C> = WindowSurface<
    <B as DeviceBackend>::Device,
    BackendSurface<B>,
    <C as GraphicsContext<BackendSurface<B>>>::Surface,
>;

/// The one display the driver exposes
#[derive(Debug)]
pub struct VideoDisplay {
    desktop_mode: DisplayMode,
    current_mode: DisplayMode,
    descriptor: DisplayDescriptor,
}

impl VideoDisplay {
    fn new(descriptor: DisplayDescriptor) -> Self {
        let mode = descriptor.display_mode();
        Self {
            desktop_mode: mode,
            current_mode: mode,
            descriptor,
        }
    }

    pub fn desktop_mode(&self) -> DisplayMode {
        self.desktop_mode
    }

    pub fn current_mode(&self) -> DisplayMode {
        self.current_mode
    }

    /// The negotiated connector/CRTC behind this display
    pub fn descriptor(&self) -> &DisplayDescriptor {
        &self.descriptor
    }
}

/// Acknowledgement returned by [`VideoDriver::window_wm_info`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmInfo {
    pub subsystem: &'static str,
    pub major_version: u32,
}

struct ActiveDevice<B: DeviceBackend> {
    display: VideoDisplay,
    context: DeviceContext<B>,
}

impl<B: DeviceBackend> Drop for ActiveDevice<B> {
    fn drop(&mut self) {
        // Runs before `context` closes the device.
        self.display.descriptor.restore_crtc(self.context.device());
    }
}

/// A KMS/DRM video driver instance
pub struct VideoDriver<B, C = NoContext, I = NullInput>
where
    B: DeviceBackend,
{
    backend: B,
    config: DriverConfig,
    enumerator: DeviceEnumerator,
    devindex: u32,
    graphics: Option<C>,
    input: I,
    windows: Arc<()>,
    active: Option<ActiveDevice<B>>,
}

impl<B: DeviceBackend> VideoDriver<B> {
    /// Whether any device under the configured directory is usable
    pub fn available(backend: &B, config: &DriverConfig) -> bool {
        config.enumerator().select_default(backend).is_ok()
    }

    /// Create a driver for device `devindex`
    ///
    /// An index of `0` or above [`MAX_DEVICE_INDEX`] selects the first usable
    /// device instead.
    pub fn create(backend: B, config: DriverConfig, devindex: u32) -> Result<Self> {
        let enumerator = config.enumerator();
        let devindex = if devindex == 0 || devindex > MAX_DEVICE_INDEX {
            enumerator.select_default(&backend)?
        } else {
            devindex
        };
        debug!("Using device index {}", devindex);

        Ok(Self {
            backend,
            config,
            enumerator,
            devindex,
            graphics: None,
            input: NullInput,
            windows: Arc::new(()),
            active: None,
        })
    }

    /// Create a driver for the device named by `config.device_index`
    pub fn from_config(backend: B, config: DriverConfig) -> Result<Self> {
        let devindex = config.device_index.unwrap_or(0);
        Self::create(backend, config, devindex)
    }
}

impl<B, C, I> VideoDriver<B, C, I>
where
    B: DeviceBackend,
    C: GraphicsContext<BackendSurface<B>>,
    I: InputSource,
{
    /// Bind windows to a graphics context
    pub fn with_graphics_context<C2>(self, graphics: C2) -> VideoDriver<B, C2, I>
    where
        C2: GraphicsContext<BackendSurface<B>>,
    {
        VideoDriver {
            backend: self.backend,
            config: self.config,
            enumerator: self.enumerator,
            devindex: self.devindex,
            graphics: Some(graphics),
            input: self.input,
            windows: self.windows,
            active: self.active,
        }
    }

    /// Deliver input through `input`
    pub fn with_input<I2: InputSource>(self, input: I2) -> VideoDriver<B, C, I2> {
        VideoDriver {
            backend: self.backend,
            config: self.config,
            enumerator: self.enumerator,
            devindex: self.devindex,
            graphics: self.graphics,
            input,
            windows: self.windows,
            active: self.active,
        }
    }

    /// Device index this driver opens
    pub fn device_index(&self) -> u32 {
        self.devindex
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Windows created by this driver that are still alive
    pub fn outstanding_windows(&self) -> usize {
        Arc::strong_count(&self.windows) - 1
    }

    pub fn is_initialized(&self) -> bool {
        self.active.is_some()
    }

    /// The open device, while initialized
    pub fn device(&self) -> Option<&B::Device> {
        self.active.as_ref().map(|active| active.context.device())
    }

    /// The registered display, while initialized
    pub fn display(&self) -> Option<&VideoDisplay> {
        self.active.as_ref().map(|active| &active.display)
    }

    /// Open the device and negotiate the display
    ///
    /// On failure everything acquired so far is released again.
    pub fn init(&mut self) -> Result<()> {
        if self.active.is_some() {
            warn!("Video driver already initialized");
            return Ok(());
        }

        info!("Initializing {} video driver", DRIVER_NAME);
        let context = DeviceContext::open(&self.backend, &self.enumerator, self.devindex)?;
        let descriptor = display::negotiate(context.device())?;

        let video_display = VideoDisplay::new(descriptor);
        let connector_name = video_display.descriptor.connector_name();
        let mode = video_display.current_mode;
        info!(
            "{} on {}: {}",
            context.path().display(),
            connector_name,
            mode
        );

        self.active = Some(ActiveDevice {
            display: video_display,
            context,
        });

        if let Err(e) = self.input.init() {
            warn!("Input is unavailable: {}", e);
        }
        Ok(())
    }

    /// Restore the saved CRTC and release the device
    ///
    /// Windows must be destroyed before quitting. Calling this again is a no-op.
    pub fn quit(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        info!("Shutting down {} video driver", DRIVER_NAME);
        let outstanding = self.outstanding_windows();
        if outstanding > 0 {
            warn!(
                "{} window(s) still alive at quit; the device stays open until they drop",
                outstanding
            );
        }

        self.input.quit();
        let path = active.context.path().to_path_buf();
        drop(active);
        debug!("Closed DRM device {}", path.display());
    }

    /// Display modes: only the current one
    pub fn display_modes(&self) -> Vec<DisplayMode> {
        self.display()
            .map(|display| vec![display.current_mode])
            .unwrap_or_default()
    }

    /// Accept a mode change without changing anything
    pub fn set_display_mode(&mut self, mode: &DisplayMode) -> Result<()> {
        debug!("set_display_mode({}) ignored", mode);
        Ok(())
    }

    /// Create the full-screen window
    pub fn create_window(&mut self, flags: WindowFlags) -> Result<DriverWindow<B, C>> {
        let active = self.active.as_ref().ok_or(KmsError::NotInitialized)?;
        let window = WindowSurface::create(
            active.context.device(),
            active.context.allocator(),
            &active.display.descriptor,
            flags,
            &self.config,
            self.graphics.as_mut(),
        )?;
        Ok(window.with_lease(Arc::clone(&self.windows)))
    }

    /// Windows cannot wrap foreign native windows
    pub fn create_window_from(&mut self) -> Result<DriverWindow<B, C>> {
        Err(KmsError::Unsupported(
            "creating a window from a native handle".to_string(),
        ))
    }

    /// Present the window's latest frame
    pub fn present(&self, window: &mut DriverWindow<B, C>) -> Result<PresentOutcome> {
        if self.active.is_none() {
            return Err(KmsError::NotInitialized);
        }
        window.present()
    }

    /// Destroy a window, waiting for its pending flip first
    pub fn destroy_window(&self, window: DriverWindow<B, C>) {
        if self.active.is_none() {
            debug!("Destroying window after driver quit");
        }
        window.destroy();
    }

    /// Window-manager info: an acknowledgement only
    pub fn window_wm_info(&self, requested_major: u32) -> Result<WmInfo> {
        if requested_major > WM_INFO_MAJOR_VERSION {
            return Err(KmsError::Unsupported(format!(
                "application not compiled with window manager info version {}",
                WM_INFO_MAJOR_VERSION
            )));
        }
        Ok(WmInfo {
            subsystem: DRIVER_NAME,
            major_version: WM_INFO_MAJOR_VERSION,
        })
    }

    /// Process pending input
    pub fn pump_events(&mut self) {
        self.input.pump();
    }
}
