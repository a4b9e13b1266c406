//! Page-flip submission and the blocking wait for its completion
//!
//! Each window has at most one flip outstanding. Submitting moves the window
//! from [`FlipState::Idle`] to [`FlipState::FlipPending`]; only a flip-complete
//! event for the window's CRTC moves it back.

use tracing::{debug, error, trace};

use crate::error::{KmsError, PresentationError, Result};
use crate::kms::{FlipTimeout, KmsDevice, KmsEvent, Readiness};
use crate::types::{CrtcId, FramebufferId};

/// Flip state of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlipState {
    /// No flip outstanding; buffers may be reused
    #[default]
    Idle,
    /// A flip was submitted and the kernel has not confirmed it yet
    FlipPending,
}

/// Tracks the outstanding flip of one window on one CRTC
#[derive(Debug, Clone)]
pub struct PageFlipScheduler {
    crtc: CrtcId,
    state: FlipState,
    completed: u64,
}

impl PageFlipScheduler {
    /// A scheduler for flips on `crtc`, starting idle
    pub fn new(crtc: CrtcId) -> Self {
        Self {
            crtc,
            state: FlipState::Idle,
            completed: 0,
        }
    }

    /// CRTC the flips are submitted on
    pub fn crtc(&self) -> CrtcId {
        self.crtc
    }

    /// Current flip state
    pub fn state(&self) -> FlipState {
        self.state
    }

    /// Whether a flip is outstanding
    pub fn is_pending(&self) -> bool {
        self.state == FlipState::FlipPending
    }

    /// Number of flips the kernel has confirmed
    pub fn completed_flips(&self) -> u64 {
        self.completed
    }

    /// Queue a flip to `framebuffer`
    ///
    /// Fails with [`KmsError::FlipAlreadyPending`] without touching the kernel
    /// if a flip is still outstanding. If the kernel rejects the flip the
    /// window stays idle.
    pub fn submit<D: KmsDevice>(&mut self, device: &D, framebuffer: FramebufferId) -> Result<()> {
        if self.is_pending() {
            return Err(KmsError::FlipAlreadyPending);
        }

        device.page_flip(self.crtc, framebuffer).map_err(|e| {
            KmsError::Io(e).with_context(format!("Could not queue page flip on {}", self.crtc))
        })?;

        trace!("Queued flip to fb {} on {}", framebuffer.0, self.crtc);
        self.state = FlipState::FlipPending;
        Ok(())
    }

    /// Block until the outstanding flip completes
    ///
    /// Returns immediately if no flip is outstanding, without polling.
    /// Otherwise polls the device with `timeout` and dispatches its events
    /// until a flip-complete event for this CRTC arrives. Poll failure, hangup
    /// and timeout are reported as [`PresentationError`]s and leave the flip
    /// pending.
    pub fn wait<D: KmsDevice>(&mut self, device: &D, timeout: FlipTimeout) -> Result<()> {
        while self.is_pending() {
            let readiness = device.poll(timeout).map_err(|e| {
                error!("DRM poll error: {}", e);
                PresentationError::PollFailed(e)
            })?;

            if readiness.intersects(Readiness::HANGUP | Readiness::ERROR) {
                error!("DRM poll hup or error");
                return Err(PresentationError::HangUp.into());
            }

            if !readiness.contains(Readiness::READABLE) {
                debug!("Dropping frame while waiting_for_flip");
                return Err(PresentationError::FrameDropped.into());
            }

            let events = device.receive_events().map_err(|e| {
                error!("Failed to read DRM events: {}", e);
                PresentationError::PollFailed(e)
            })?;
            self.dispatch(&events);
        }

        Ok(())
    }

    /// Apply kernel events to the flip state
    ///
    /// Only a flip completion on this scheduler's CRTC ends a pending flip.
    pub fn dispatch(&mut self, events: &[KmsEvent]) {
        for event in events {
            match event {
                KmsEvent::FlipComplete { crtc, frame, time } if *crtc == self.crtc => {
                    trace!("Flip complete on {}: frame {} at {:?}", crtc, frame, time);
                    if self.is_pending() {
                        self.state = FlipState::Idle;
                        self.completed += 1;
                    }
                }
                other => trace!("Ignoring DRM event {:?}", other),
            }
        }
    }
}
