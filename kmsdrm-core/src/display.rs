//! Connector/encoder/CRTC negotiation and CRTC save/restore
//!
//! Negotiation picks the first connected connector that has modes, an encoder
//! able to drive it, and a CRTC for that encoder. The CRTC's configuration at
//! that moment is saved so it can be put back when the driver quits.

use tracing::{debug, warn};

use crate::error::{KmsError, NegotiationError, Result};
use crate::kms::KmsDevice;
use crate::types::{
    ConnectorId, ConnectorInfo, CrtcId, CrtcState, DisplayMode, EncoderInfo, ModeInfo,
    ResourceList,
};

/// The negotiated output of one physical display
#[derive(Debug)]
pub struct DisplayDescriptor {
    connector: ConnectorId,
    connector_name: String,
    crtc: CrtcId,
    mode: ModeInfo,
    saved_crtc: Option<CrtcState>,
}

impl DisplayDescriptor {
    /// Connector driving the display
    pub fn connector(&self) -> ConnectorId {
        self.connector
    }

    /// Name of the connector, e.g. "HDMI-A-1"
    pub fn connector_name(&self) -> &str {
        &self.connector_name
    }

    /// CRTC scanning out to the display
    pub fn crtc(&self) -> CrtcId {
        self.crtc
    }

    /// The single resolved mode
    pub fn mode(&self) -> &ModeInfo {
        &self.mode
    }

    /// The resolved mode as exposed to the host
    pub fn display_mode(&self) -> DisplayMode {
        DisplayMode::from(&self.mode)
    }

    /// CRTC configuration captured during negotiation, until it is restored
    pub fn saved_crtc(&self) -> Option<&CrtcState> {
        self.saved_crtc.as_ref()
    }

    /// Reapply the saved CRTC configuration
    ///
    /// The saved state is consumed on the first call whether or not the
    /// kernel accepts it; later calls do nothing and return `false`. A
    /// rejected restore is logged, never propagated.
    pub fn restore_crtc<D: KmsDevice>(&mut self, device: &D) -> bool {
        let Some(saved) = self.saved_crtc.take() else {
            return false;
        };

        debug!(
            "Restoring crtc_id {}, fb_id {:?}, ({},{})",
            saved.id.0,
            saved.framebuffer.map(|fb| fb.0),
            saved.position.0,
            saved.position.1
        );

        if let Err(e) = device.set_crtc(
            saved.id,
            saved.framebuffer,
            saved.position,
            &[self.connector],
            saved.mode.as_ref(),
        ) {
            warn!("Could not restore original CRTC mode: {}", e);
        }
        true
    }
}

/// Query the device and negotiate the connector, encoder and CRTC to drive
pub fn negotiate<D: KmsDevice>(device: &D) -> Result<DisplayDescriptor> {
    let resources = device
        .resources()
        .map_err(|e| KmsError::resource_query(format!("drmModeGetResources failed: {}", e)))?;

    let connector = find_connector(device, &resources)?;
    debug!(
        "Found connector {} with {} modes.",
        connector.id.0,
        connector.modes.len()
    );

    let encoder = find_encoder(device, &resources, &connector)?;
    debug!("Found encoder {}.", encoder.id.0);

    let saved = find_crtc(device, &resources, &encoder)?;
    debug!(
        "Saved crtc_id {}, fb_id {:?}, ({},{}), {}",
        saved.id.0,
        saved.framebuffer.map(|fb| fb.0),
        saved.position.0,
        saved.position.1,
        saved
            .mode
            .as_ref()
            .map_or_else(|| "no mode".to_string(), ToString::to_string)
    );

    let mode = match &saved.mode {
        Some(mode) => mode.clone(),
        None => {
            debug!("Current mode is invalid, selecting connector's mode #0.");
            // find_connector only accepts connectors with modes
            connector.modes[0].clone()
        }
    };

    Ok(DisplayDescriptor {
        connector: connector.id,
        connector_name: connector.name,
        crtc: saved.id,
        mode,
        saved_crtc: Some(saved),
    })
}

fn find_connector<D: KmsDevice>(device: &D, resources: &ResourceList) -> Result<ConnectorInfo> {
    resources
        .connectors
        .iter()
        .filter_map(|&id| device.connector(id).ok())
        .find(ConnectorInfo::is_active)
        .ok_or_else(|| NegotiationError::NoActiveConnector.into())
}

/// The connector's current encoder if it is listed, else the first listed
/// encoder the connector supports
///
/// A single first-match scan over "current or supported" could pick a
/// supported encoder listed ahead of the current one; this never does.
fn find_encoder<D: KmsDevice>(
    device: &D,
    resources: &ResourceList,
    connector: &ConnectorInfo,
) -> Result<EncoderInfo> {
    let encoders: Vec<EncoderInfo> = resources
        .encoders
        .iter()
        .filter_map(|&id| device.encoder(id).ok())
        .collect();

    let current = connector
        .current_encoder
        .and_then(|current| encoders.iter().position(|e| e.id == current));
    let supported = || encoders.iter().position(|e| connector.encoders.contains(&e.id));

    current
        .or_else(supported)
        .map(|i| encoders[i].clone())
        .ok_or_else(|| NegotiationError::NoConnectedEncoder.into())
}

fn find_crtc<D: KmsDevice>(
    device: &D,
    resources: &ResourceList,
    encoder: &EncoderInfo,
) -> Result<CrtcState> {
    if let Some(saved) = encoder.crtc.and_then(|id| device.crtc(id).ok()) {
        return Ok(saved);
    }

    let (_, crtc_id) = resources
        .crtcs
        .iter()
        .enumerate()
        .find(|(i, _)| encoder.can_use_crtc_index(*i))
        .ok_or(NegotiationError::NoCrtcFound)?;

    debug!("Set encoder's CRTC to {}.", crtc_id.0);
    device
        .crtc(*crtc_id)
        .map_err(|_| NegotiationError::NoCrtcFound.into())
}
