//! Mock infrastructure for testing
//!
//! Scripted in-memory stand-ins for a mode-setting device, a buffer
//! allocator and a graphics context. Every fake records what was done to it
//! so tests can assert on kernel calls and release order.

#![allow(dead_code)]

use kmsdrm_core::buffer::{BufferAllocator, RenderSurface, ScanoutBuffer};
use kmsdrm_core::device::DeviceBackend;
use kmsdrm_core::error::{KmsError, Result};
use kmsdrm_core::framebuffer::FramebufferHandle;
use kmsdrm_core::kms::{FlipTimeout, KmsDevice, KmsEvent, Readiness};
use kmsdrm_core::types::{
    BufferLayout, BufferUsage, ConnectionState, ConnectorId, ConnectorInfo, CrtcId, CrtcState,
    EncoderId, EncoderInfo, FramebufferId, ModeInfo, PixelFormat, ResourceList,
};
use kmsdrm_core::window::{ContextSurface, GraphicsContext};
use std::cell::{Cell, OnceCell, Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

/// Shared, ordered log of teardown-relevant actions
pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

/// One scripted answer to a poll
#[derive(Debug, Clone)]
pub enum PollStep {
    /// Readable, delivering these events
    Readable(Vec<KmsEvent>),
    /// Nothing happened before the timeout
    Timeout,
    /// The descriptor hung up
    HangUp,
    /// poll(2) itself failed
    Fail,
}

/// A recorded set_crtc call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCrtcCall {
    pub crtc: CrtcId,
    pub framebuffer: Option<FramebufferId>,
    pub position: (u32, u32),
    pub connectors: Vec<ConnectorId>,
    pub mode: Option<ModeInfo>,
}

/// Everything a fake device knows and everything done to it
pub struct DeviceState {
    /// `None` makes the resource query fail
    pub resources: Option<ResourceList>,
    pub connectors: HashMap<ConnectorId, ConnectorInfo>,
    pub encoders: HashMap<EncoderId, EncoderInfo>,
    pub crtcs: HashMap<CrtcId, CrtcState>,

    /// Answers for upcoming polls; when empty, queued kernel events make the
    /// descriptor readable and otherwise the poll times out
    pub poll_script: VecDeque<PollStep>,
    /// Queue page-flip completions as soon as a flip is submitted
    pub auto_complete_flips: bool,
    pub fail_set_crtc: bool,
    pub fail_add_framebuffer: bool,
    pub fail_page_flip: bool,

    pub kernel_events: Vec<KmsEvent>,
    pub poll_calls: usize,
    pub poll_timeouts: Vec<FlipTimeout>,
    pub set_crtc_calls: Vec<SetCrtcCall>,
    pub added_framebuffers: Vec<(FramebufferId, BufferLayout)>,
    pub removed_framebuffers: Vec<FramebufferId>,
    pub page_flips: Vec<(CrtcId, FramebufferId)>,
    pub open_descriptors: usize,
    pub journal: Journal,
    pub next_framebuffer: u32,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            resources: Some(ResourceList::default()),
            connectors: HashMap::new(),
            encoders: HashMap::new(),
            crtcs: HashMap::new(),
            poll_script: VecDeque::new(),
            auto_complete_flips: true,
            fail_set_crtc: false,
            fail_add_framebuffer: false,
            fail_page_flip: false,
            kernel_events: Vec::new(),
            poll_calls: 0,
            poll_timeouts: Vec::new(),
            set_crtc_calls: Vec::new(),
            added_framebuffers: Vec::new(),
            removed_framebuffers: Vec::new(),
            page_flips: Vec::new(),
            open_descriptors: 0,
            journal: journal(),
            next_framebuffer: 100,
        }
    }
}

impl DeviceState {
    pub fn add_connector(&mut self, connector: ConnectorInfo) {
        if let Some(res) = self.resources.as_mut() {
            res.connectors.push(connector.id);
        }
        self.connectors.insert(connector.id, connector);
    }

    pub fn add_encoder(&mut self, encoder: EncoderInfo) {
        if let Some(res) = self.resources.as_mut() {
            res.encoders.push(encoder.id);
        }
        self.encoders.insert(encoder.id, encoder);
    }

    pub fn add_crtc(&mut self, crtc: CrtcState) {
        if let Some(res) = self.resources.as_mut() {
            res.crtcs.push(crtc.id);
        }
        self.crtcs.insert(crtc.id, crtc);
    }

    /// Counts of connectors, encoders and CRTCs without querying them
    pub fn with_counts(connectors: u32, encoders: u32, crtcs: u32) -> Self {
        Self {
            resources: Some(ResourceList {
                connectors: (1..=connectors).map(ConnectorId).collect(),
                encoders: (1..=encoders).map(EncoderId).collect(),
                crtcs: (1..=crtcs).map(CrtcId).collect(),
            }),
            ..Self::default()
        }
    }

    /// One connected connector, its current encoder, and a CRTC showing `mode`
    pub fn single_display(mode: ModeInfo) -> Self {
        let mut state = Self::default();
        state.add_connector(connector(
            10,
            ConnectionState::Connected,
            vec![mode.clone()],
            &[20],
            Some(20),
        ));
        state.add_encoder(encoder(20, Some(30), 0b1));
        state.add_crtc(crtc(30, Some(5), Some(mode)));
        state
    }

    /// Two connectors: A disconnected, B connected with three modes on encoder 7,
    /// whose CRTC 41 already shows 2560x1440@144
    pub fn two_connector_scenario() -> Self {
        let mut state = Self::default();
        state.add_connector(connector(
            1,
            ConnectionState::Disconnected,
            vec![],
            &[6],
            None,
        ));
        state.add_connector(connector(
            2,
            ConnectionState::Connected,
            vec![
                ModeInfo::new(3840, 2160, 60),
                ModeInfo::new(2560, 1440, 144),
                ModeInfo::new(1920, 1080, 60),
            ],
            &[6, 7],
            Some(7),
        ));
        state.add_encoder(encoder(6, None, 0b01));
        state.add_encoder(encoder(7, Some(41), 0b10));
        state.add_crtc(crtc(40, None, None));
        state.add_crtc(CrtcState {
            id: CrtcId(41),
            framebuffer: Some(FramebufferId(77)),
            position: (0, 0),
            mode: Some(ModeInfo::new(2560, 1440, 144)),
        });
        state
    }
}

pub fn connector(
    id: u32,
    state: ConnectionState,
    modes: Vec<ModeInfo>,
    encoders: &[u32],
    current_encoder: Option<u32>,
) -> ConnectorInfo {
    ConnectorInfo {
        id: ConnectorId(id),
        name: format!("DP-{}", id),
        state,
        modes,
        encoders: encoders.iter().copied().map(EncoderId).collect(),
        current_encoder: current_encoder.map(EncoderId),
    }
}

pub fn encoder(id: u32, crtc: Option<u32>, possible_crtcs: u32) -> EncoderInfo {
    EncoderInfo {
        id: EncoderId(id),
        crtc: crtc.map(CrtcId),
        possible_crtcs,
    }
}

pub fn crtc(id: u32, framebuffer: Option<u32>, mode: Option<ModeInfo>) -> CrtcState {
    CrtcState {
        id: CrtcId(id),
        framebuffer: framebuffer.map(FramebufferId),
        position: (0, 0),
        mode,
    }
}

pub fn flip_complete(crtc: u32) -> KmsEvent {
    KmsEvent::FlipComplete {
        crtc: CrtcId(crtc),
        frame: 1,
        time: Duration::from_millis(16),
    }
}

struct FakeDescriptor {
    state: Rc<RefCell<DeviceState>>,
}

impl Drop for FakeDescriptor {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.open_descriptors -= 1;
        state.journal.borrow_mut().push("close device".to_string());
    }
}

/// A scripted mode-setting device
///
/// Clones share state and descriptor, like clones of a real card handle.
#[derive(Clone)]
pub struct FakeDevice {
    state: Rc<RefCell<DeviceState>>,
    _descriptor: Rc<FakeDescriptor>,
}

impl FakeDevice {
    /// Open a new descriptor on `state`
    pub fn open(state: &Rc<RefCell<DeviceState>>) -> Self {
        state.borrow_mut().open_descriptors += 1;
        Self {
            state: Rc::clone(state),
            _descriptor: Rc::new(FakeDescriptor {
                state: Rc::clone(state),
            }),
        }
    }

    pub fn new(state: DeviceState) -> Self {
        Self::open(&Rc::new(RefCell::new(state)))
    }

    pub fn state(&self) -> Ref<'_, DeviceState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, DeviceState> {
        self.state.borrow_mut()
    }

    pub fn shared_state(&self) -> Rc<RefCell<DeviceState>> {
        Rc::clone(&self.state)
    }
}

fn not_found(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, what.to_string())
}

impl KmsDevice for FakeDevice {
    fn resources(&self) -> io::Result<ResourceList> {
        self.state()
            .resources
            .clone()
            .ok_or_else(|| io::Error::other("no mode-setting resources"))
    }

    fn connector(&self, id: ConnectorId) -> io::Result<ConnectorInfo> {
        self.state()
            .connectors
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("connector"))
    }

    fn encoder(&self, id: EncoderId) -> io::Result<EncoderInfo> {
        self.state()
            .encoders
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("encoder"))
    }

    fn crtc(&self, id: CrtcId) -> io::Result<CrtcState> {
        self.state()
            .crtcs
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("crtc"))
    }

    fn set_crtc(
        &self,
        crtc: CrtcId,
        framebuffer: Option<FramebufferId>,
        position: (u32, u32),
        connectors: &[ConnectorId],
        mode: Option<&ModeInfo>,
    ) -> io::Result<()> {
        let mut state = self.state_mut();
        state.set_crtc_calls.push(SetCrtcCall {
            crtc,
            framebuffer,
            position,
            connectors: connectors.to_vec(),
            mode: mode.cloned(),
        });
        state.journal.borrow_mut().push(format!("set_crtc {}", crtc));
        if state.fail_set_crtc {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(())
    }

    fn add_framebuffer(
        &self,
        layout: &BufferLayout,
        _depth: u32,
        _bpp: u32,
    ) -> io::Result<FramebufferId> {
        let mut state = self.state_mut();
        if state.fail_add_framebuffer {
            return Err(io::Error::from(io::ErrorKind::OutOfMemory));
        }
        state.next_framebuffer += 1;
        let id = FramebufferId(state.next_framebuffer);
        state.added_framebuffers.push((id, *layout));
        Ok(id)
    }

    fn remove_framebuffer(&self, framebuffer: FramebufferId) -> io::Result<()> {
        let mut state = self.state_mut();
        state.removed_framebuffers.push(framebuffer);
        state
            .journal
            .borrow_mut()
            .push(format!("remove {}", framebuffer));
        Ok(())
    }

    fn page_flip(&self, crtc: CrtcId, framebuffer: FramebufferId) -> io::Result<()> {
        let mut guard = self.state_mut();
        let state = &mut *guard;
        if state.fail_page_flip {
            return Err(io::Error::from(io::ErrorKind::ResourceBusy));
        }
        state.page_flips.push((crtc, framebuffer));
        let frame = state.page_flips.len() as u32;
        if state.auto_complete_flips {
            state.kernel_events.push(KmsEvent::FlipComplete {
                crtc,
                frame,
                time: Duration::from_millis(16),
            });
        }
        Ok(())
    }

    fn poll(&self, timeout: FlipTimeout) -> io::Result<Readiness> {
        let mut guard = self.state_mut();
        let state = &mut *guard;
        state.poll_calls += 1;
        state.poll_timeouts.push(timeout);
        state.journal.borrow_mut().push("poll".to_string());

        let step = state.poll_script.pop_front();
        match step {
            Some(PollStep::Readable(events)) => {
                state.kernel_events.extend(events);
                Ok(Readiness::READABLE)
            }
            Some(PollStep::Timeout) => Ok(Readiness::empty()),
            Some(PollStep::HangUp) => Ok(Readiness::HANGUP),
            Some(PollStep::Fail) => Err(io::Error::from(io::ErrorKind::Interrupted)),
            None if !state.kernel_events.is_empty() => Ok(Readiness::READABLE),
            None => Ok(Readiness::empty()),
        }
    }

    fn receive_events(&self) -> io::Result<Vec<KmsEvent>> {
        Ok(std::mem::take(&mut self.state_mut().kernel_events))
    }
}

/// Allocator-side bookkeeping
#[derive(Default)]
pub struct AllocState {
    pub format_supported: bool,
    pub fail_create_surface: bool,
    pub live_allocators: usize,
    pub live_surfaces: usize,
    pub surfaces_created: Vec<(u32, u32, PixelFormat, BufferUsage)>,
    pub format_queries: usize,
    /// Handles of buffers released back to their surface, in order
    pub released: Vec<u32>,
    pub journal: Journal,
}

impl AllocState {
    pub fn released_count(&self, handle: u32) -> usize {
        self.released.iter().filter(|&&h| h == handle).count()
    }
}

struct BufferSlot {
    handle: u32,
    width: u32,
    height: u32,
    locked: Cell<bool>,
    framebuffer: OnceCell<FramebufferHandle<FakeDevice>>,
}

/// A locked buffer; dropping it releases it back to its surface
pub struct FakeBuffer {
    slot: Rc<BufferSlot>,
    alloc: Rc<RefCell<AllocState>>,
}

impl FakeBuffer {
    pub fn handle(&self) -> u32 {
        self.slot.handle
    }
}

impl Drop for FakeBuffer {
    fn drop(&mut self) {
        self.slot.locked.set(false);
        let mut alloc = self.alloc.borrow_mut();
        alloc.released.push(self.slot.handle);
        alloc
            .journal
            .borrow_mut()
            .push(format!("release bo {}", self.slot.handle));
    }
}

impl ScanoutBuffer<FakeDevice> for FakeBuffer {
    fn layout(&self) -> BufferLayout {
        BufferLayout {
            width: self.slot.width,
            height: self.slot.height,
            stride: self.slot.width * 4,
            handle: self.slot.handle,
        }
    }

    fn framebuffer(&self) -> Option<&FramebufferHandle<FakeDevice>> {
        self.slot.framebuffer.get()
    }

    fn attach_framebuffer(&mut self, framebuffer: FramebufferHandle<FakeDevice>) {
        let _ = self.slot.framebuffer.set(framebuffer);
    }
}

/// Number of buffer objects a fake surface rotates through
pub const SURFACE_BUFFERS: usize = 3;

/// A rendering surface rotating through a fixed set of buffer objects
pub struct FakeSurface {
    slots: Vec<Rc<BufferSlot>>,
    next: usize,
    alloc: Rc<RefCell<AllocState>>,
}

impl FakeSurface {
    pub fn size(&self) -> (u32, u32) {
        (self.slots[0].width, self.slots[0].height)
    }
}

impl Drop for FakeSurface {
    fn drop(&mut self) {
        let mut alloc = self.alloc.borrow_mut();
        alloc.live_surfaces -= 1;
        alloc.journal.borrow_mut().push("destroy surface".to_string());
        // Buffer objects (and their framebuffers) go with the surface.
        drop(alloc);
        self.slots.clear();
    }
}

impl RenderSurface<FakeDevice> for FakeSurface {
    type Buffer = FakeBuffer;

    fn lock_front_buffer(&mut self) -> Result<FakeBuffer> {
        for _ in 0..self.slots.len() {
            let slot = Rc::clone(&self.slots[self.next]);
            self.next = (self.next + 1) % self.slots.len();
            if !slot.locked.get() {
                slot.locked.set(true);
                return Ok(FakeBuffer {
                    slot,
                    alloc: Rc::clone(&self.alloc),
                });
            }
        }
        Err(KmsError::allocation("all buffers locked"))
    }

    fn has_free_buffers(&self) -> bool {
        self.slots.iter().any(|slot| !slot.locked.get())
    }
}

/// A buffer allocator bound to one fake device
pub struct FakeAllocator {
    state: Rc<RefCell<AllocState>>,
}

impl FakeAllocator {
    pub fn new(state: &Rc<RefCell<AllocState>>) -> Self {
        state.borrow_mut().live_allocators += 1;
        Self {
            state: Rc::clone(state),
        }
    }

    pub fn state(&self) -> Ref<'_, AllocState> {
        self.state.borrow()
    }
}

impl Drop for FakeAllocator {
    fn drop(&mut self) {
        let mut state = self.state.borrow_mut();
        state.live_allocators -= 1;
        state.journal.borrow_mut().push("destroy allocator".to_string());
    }
}

impl BufferAllocator<FakeDevice> for FakeAllocator {
    type Surface = FakeSurface;

    fn is_format_supported(&self, _format: PixelFormat, _usage: BufferUsage) -> bool {
        let mut state = self.state.borrow_mut();
        state.format_queries += 1;
        state.format_supported
    }

    fn create_surface(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: BufferUsage,
    ) -> Result<FakeSurface> {
        let mut state = self.state.borrow_mut();
        if state.fail_create_surface {
            return Err(KmsError::surface_creation("fake surface creation failure"));
        }
        state.surfaces_created.push((width, height, format, usage));
        state.live_surfaces += 1;

        let base = 1 + 10 * state.surfaces_created.len() as u32;
        let slots = (0..SURFACE_BUFFERS as u32)
            .map(|i| {
                Rc::new(BufferSlot {
                    handle: base + i,
                    width,
                    height,
                    locked: Cell::new(false),
                    framebuffer: OnceCell::new(),
                })
            })
            .collect();

        Ok(FakeSurface {
            slots,
            next: 0,
            alloc: Rc::clone(&self.state),
        })
    }
}

/// Backend serving fake devices keyed by path
///
/// Clones share every device and the allocator state, so a test can hand a
/// clone to the driver and keep inspecting through the original.
#[derive(Clone)]
pub struct FakeBackend {
    pub devices: HashMap<PathBuf, Rc<RefCell<DeviceState>>>,
    pub alloc: Rc<RefCell<AllocState>>,
    pub fail_allocator: bool,
    pub opens: Rc<Cell<usize>>,
    pub journal: Journal,
}

impl FakeBackend {
    pub fn new() -> Self {
        let journal = journal();
        Self {
            devices: HashMap::new(),
            alloc: Rc::new(RefCell::new(AllocState {
                format_supported: true,
                journal: Rc::clone(&journal),
                ..AllocState::default()
            })),
            fail_allocator: false,
            opens: Rc::new(Cell::new(0)),
            journal,
        }
    }

    /// Serve `state` at `path`, sharing the backend's journal
    pub fn with_device(mut self, path: impl Into<PathBuf>, mut state: DeviceState) -> Self {
        state.journal = Rc::clone(&self.journal);
        self.devices
            .insert(path.into(), Rc::new(RefCell::new(state)));
        self
    }

    pub fn device_state(&self, path: impl AsRef<Path>) -> Ref<'_, DeviceState> {
        self.devices[path.as_ref()].borrow()
    }

    pub fn device_state_mut(&self, path: impl AsRef<Path>) -> RefMut<'_, DeviceState> {
        self.devices[path.as_ref()].borrow_mut()
    }

    /// Descriptors currently open across all devices
    pub fn open_descriptors(&self) -> usize {
        self.devices
            .values()
            .map(|state| state.borrow().open_descriptors)
            .sum()
    }
}

/// A device directory holding empty files with the given names
pub fn device_dir(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::TempDir::new().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), b"").unwrap();
    }
    dir
}

impl DeviceBackend for FakeBackend {
    type Device = FakeDevice;
    type Allocator = FakeAllocator;

    fn open(&self, path: &Path) -> io::Result<FakeDevice> {
        let state = self
            .devices
            .get(path)
            .ok_or_else(|| not_found("device node"))?;
        self.opens.set(self.opens.get() + 1);
        Ok(FakeDevice::open(state))
    }

    fn create_allocator(&self, _device: &FakeDevice) -> Result<FakeAllocator> {
        if self.fail_allocator {
            return Err(KmsError::allocation("Couldn't create gbm device"));
        }
        Ok(FakeAllocator::new(&self.alloc))
    }
}

/// Graphics-context bookkeeping
#[derive(Default)]
pub struct ContextState {
    pub fail_create: bool,
    pub swaps: usize,
    pub live_surfaces: usize,
}

/// A graphics context rendering into fake surfaces
pub struct FakeContext {
    pub state: Rc<RefCell<ContextState>>,
    journal: Journal,
}

impl FakeContext {
    pub fn new(journal: &Journal) -> Self {
        Self {
            state: Rc::new(RefCell::new(ContextState::default())),
            journal: Rc::clone(journal),
        }
    }

    pub fn failing(journal: &Journal) -> Self {
        let context = Self::new(journal);
        context.state.borrow_mut().fail_create = true;
        context
    }
}

pub struct FakeContextSurface {
    state: Rc<RefCell<ContextState>>,
    journal: Journal,
}

impl ContextSurface for FakeContextSurface {
    fn swap_buffers(&mut self) -> Result<()> {
        self.state.borrow_mut().swaps += 1;
        Ok(())
    }
}

impl Drop for FakeContextSurface {
    fn drop(&mut self) {
        self.state.borrow_mut().live_surfaces -= 1;
        self.journal
            .borrow_mut()
            .push("destroy context surface".to_string());
    }
}

impl GraphicsContext<FakeSurface> for FakeContext {
    type Surface = FakeContextSurface;

    fn create_surface(
        &mut self,
        _native_window: &FakeSurface,
        _format: PixelFormat,
    ) -> Result<FakeContextSurface> {
        let mut state = self.state.borrow_mut();
        if state.fail_create {
            return Err(KmsError::surface_creation("eglCreateWindowSurface failed"));
        }
        state.live_surfaces += 1;
        Ok(FakeContextSurface {
            state: Rc::clone(&self.state),
            journal: Rc::clone(&self.journal),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_descriptor_closes_with_last_clone() {
        let device = FakeDevice::new(DeviceState::default());
        let clone = device.clone();
        assert_eq!(device.state().open_descriptors, 1);

        let state = device.shared_state();
        drop(device);
        assert_eq!(state.borrow().open_descriptors, 1);
        drop(clone);
        assert_eq!(state.borrow().open_descriptors, 0);
    }

    #[test]
    fn test_fake_surface_rotates_buffers() {
        let backend = FakeBackend::new();
        let alloc = FakeAllocator::new(&backend.alloc);
        let mut surface = alloc
            .create_surface(64, 32, PixelFormat::Xrgb8888, BufferUsage::SCANOUT)
            .unwrap();

        let a = surface.lock_front_buffer().unwrap();
        let b = surface.lock_front_buffer().unwrap();
        assert_ne!(a.handle(), b.handle());
        assert!(surface.has_free_buffers());
    }
}
