//! An open `/dev/dri/cardN` node driven through the `drm` crate

use drm::buffer::{self, DrmFourcc};
use drm::control::{
    self, Device as ControlDevice, Event, PageFlipFlags, ResourceHandle, connector, crtc,
    framebuffer,
};
use std::fs::OpenOptions;
use std::io;
use std::num::NonZeroU32;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::raw::c_char;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;

use crate::kms::{FlipTimeout, KmsDevice, KmsEvent, Readiness};
use crate::types::{
    BufferLayout, ConnectionState, ConnectorId, ConnectorInfo, CrtcId, CrtcState, EncoderId,
    EncoderInfo, FramebufferId, ModeInfo, ResourceList,
};

/// Length of the kernel's mode name field, including the terminator
const DISPLAY_MODE_LEN: usize = 32;

/// A shared handle to an open DRM device node
///
/// Clones share one descriptor; it is closed when the last clone drops.
#[derive(Debug, Clone)]
pub struct Card(Arc<OwnedFd>);

impl AsFd for Card {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.0.as_fd()
    }
}

impl drm::Device for Card {}
impl ControlDevice for Card {}

impl Card {
    /// Open a device node read-write and close-on-exec
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_CLOEXEC)
            .open(path)?;
        Ok(Self(Arc::new(file.into())))
    }
}

fn handle<T: ResourceHandle>(raw: u32) -> io::Result<T> {
    control::from_u32(raw)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "null DRM object id"))
}

fn mode_info(mode: &control::Mode) -> ModeInfo {
    let raw: drm_ffi::drm_mode_modeinfo = (*mode).into();
    ModeInfo {
        clock: raw.clock,
        hdisplay: raw.hdisplay,
        hsync_start: raw.hsync_start,
        hsync_end: raw.hsync_end,
        htotal: raw.htotal,
        hskew: raw.hskew,
        vdisplay: raw.vdisplay,
        vsync_start: raw.vsync_start,
        vsync_end: raw.vsync_end,
        vtotal: raw.vtotal,
        vscan: raw.vscan,
        vrefresh: raw.vrefresh,
        flags: raw.flags,
        mode_type: raw.type_,
        name: mode.name().to_string_lossy().into_owned(),
    }
}

fn drm_mode(info: &ModeInfo) -> control::Mode {
    let mut name = [0 as c_char; DISPLAY_MODE_LEN];
    for (dst, src) in name
        .iter_mut()
        .zip(info.name.bytes().take(DISPLAY_MODE_LEN - 1))
    {
        *dst = src as c_char;
    }

    control::Mode::from(drm_ffi::drm_mode_modeinfo {
        clock: info.clock,
        hdisplay: info.hdisplay,
        hsync_start: info.hsync_start,
        hsync_end: info.hsync_end,
        htotal: info.htotal,
        hskew: info.hskew,
        vdisplay: info.vdisplay,
        vsync_start: info.vsync_start,
        vsync_end: info.vsync_end,
        vtotal: info.vtotal,
        vscan: info.vscan,
        vrefresh: info.vrefresh,
        flags: info.flags,
        type_: info.mode_type,
        name,
    })
}

fn connection_state(state: connector::State) -> ConnectionState {
    match state {
        connector::State::Connected => ConnectionState::Connected,
        connector::State::Disconnected => ConnectionState::Disconnected,
        connector::State::Unknown => ConnectionState::Unknown,
    }
}

/// A buffer described only by its layout, for legacy framebuffer creation
struct LayoutBuffer(BufferLayout, NonZeroU32);

impl LayoutBuffer {
    fn new(layout: &BufferLayout) -> io::Result<Self> {
        let handle = NonZeroU32::new(layout.handle).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "buffer has no allocation handle")
        })?;
        Ok(Self(*layout, handle))
    }
}

impl buffer::Buffer for LayoutBuffer {
    fn size(&self) -> (u32, u32) {
        (self.0.width, self.0.height)
    }

    fn format(&self) -> DrmFourcc {
        DrmFourcc::Xrgb8888
    }

    fn pitch(&self) -> u32 {
        self.0.stride
    }

    fn handle(&self) -> buffer::Handle {
        buffer::Handle::from(self.1)
    }
}

impl KmsDevice for Card {
    fn resources(&self) -> io::Result<ResourceList> {
        let res = self.resource_handles()?;
        Ok(ResourceList {
            connectors: res
                .connectors()
                .iter()
                .map(|&h| ConnectorId(h.into()))
                .collect(),
            encoders: res.encoders().iter().map(|&h| EncoderId(h.into())).collect(),
            crtcs: res.crtcs().iter().map(|&h| CrtcId(h.into())).collect(),
        })
    }

    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo> {
        let info = self.get_connector(handle(id.0)?, true)?;
        Ok(ConnectorInfo {
            id,
            name: format!("{}-{}", info.interface().as_str(), info.interface_id()),
            state: connection_state(info.state()),
            modes: info.modes().iter().map(mode_info).collect(),
            encoders: info
                .encoders()
                .iter()
                .map(|&h| EncoderId(h.into()))
                .collect(),
            current_encoder: info.current_encoder().map(|h| EncoderId(h.into())),
        })
    }

    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo> {
        let info = self.get_encoder(handle(id.0)?)?;

        // Rebuild the possible-CRTC bitmask against the resource CRTC order.
        let res = self.resource_handles()?;
        let possible = res.filter_crtcs(info.possible_crtcs());
        let possible_crtcs = res
            .crtcs()
            .iter()
            .enumerate()
            .filter(|(i, crtc)| *i < 32 && possible.contains(*crtc))
            .fold(0u32, |mask, (i, _)| mask | (1 << i));

        Ok(EncoderInfo {
            id,
            crtc: info.crtc().map(|h| CrtcId(h.into())),
            possible_crtcs,
        })
    }

    fn crtc(&self, id: CrtcId) -> io::Result<CrtcState> {
        let info = self.get_crtc(handle(id.0)?)?;
        Ok(CrtcState {
            id,
            framebuffer: info.framebuffer().map(|h| FramebufferId(h.into())),
            position: info.position(),
            mode: info.mode().as_ref().map(mode_info),
        })
    }

    fn set_crtc(
        &self,
        crtc: CrtcId,
        framebuffer: Option<FramebufferId>,
        position: (u32, u32),
        connectors: &[ConnectorId],
        mode: Option<&ModeInfo>,
    ) -> io::Result<()> {
        let framebuffer: Option<framebuffer::Handle> =
            framebuffer.map(|fb| handle(fb.0)).transpose()?;
        let connectors = connectors
            .iter()
            .map(|c| handle::<connector::Handle>(c.0))
            .collect::<io::Result<Vec<_>>>()?;

        ControlDevice::set_crtc(
            self,
            handle::<crtc::Handle>(crtc.0)?,
            framebuffer,
            position,
            &connectors,
            mode.map(drm_mode),
        )
    }

    fn add_framebuffer(
        &self,
        layout: &BufferLayout,
        depth: u32,
        bpp: u32,
    ) -> io::Result<FramebufferId> {
        let fb = ControlDevice::add_framebuffer(self, &LayoutBuffer::new(layout)?, depth, bpp)?;
        Ok(FramebufferId(fb.into()))
    }

    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> io::Result<()> {
        self.destroy_framebuffer(handle(framebuffer.0)?)
    }

    fn page_flip(&self, crtc: CrtcId, framebuffer: FramebufferId) -> io::Result<()> {
        ControlDevice::page_flip(
            self,
            handle(crtc.0)?,
            handle(framebuffer.0)?,
            PageFlipFlags::EVENT,
            None,
        )
    }

    fn poll(&self, timeout: FlipTimeout) -> io::Result<Readiness> {
        let mut pfd = libc::pollfd {
            fd: self.as_fd().as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: `pfd` is a valid pollfd for the duration of the call and nfds is 1.
        let ret = unsafe { libc::poll(&mut pfd, 1, timeout.as_poll_timeout()) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }

        let mut readiness = Readiness::empty();
        readiness.set(Readiness::READABLE, pfd.revents & libc::POLLIN != 0);
        readiness.set(Readiness::HANGUP, pfd.revents & libc::POLLHUP != 0);
        readiness.set(Readiness::ERROR, pfd.revents & libc::POLLERR != 0);
        Ok(readiness)
    }

    fn receive_events(&self) -> io::Result<Vec<KmsEvent>> {
        let events = ControlDevice::receive_events(self)?;
        Ok(events
            .map(|event| match event {
                Event::PageFlip(flip) => KmsEvent::FlipComplete {
                    crtc: CrtcId(flip.crtc.into()),
                    frame: flip.frame,
                    time: flip.duration,
                },
                Event::Vblank(vblank) => KmsEvent::Vblank {
                    crtc: CrtcId(vblank.crtc.into()),
                    frame: vblank.frame,
                },
                _ => KmsEvent::Other,
            })
            .collect())
    }
}
