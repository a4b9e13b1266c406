//! Error types for kmsdrm

use thiserror::Error;

/// Result type alias using KmsError
pub type Result<T> = std::result::Result<T, KmsError>;

/// Why display negotiation could not pick a connector/encoder/CRTC triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// No connector is connected with at least one mode
    #[error("No currently active connector found")]
    NoActiveConnector,

    /// No encoder can drive the chosen connector
    #[error("No connected encoder found")]
    NoConnectedEncoder,

    /// The encoder has no current CRTC and none of its possible CRTCs exist
    #[error("No CRTC found")]
    NoCrtcFound,
}

/// Why a page-flip wait gave up
#[derive(Debug, Error)]
pub enum PresentationError {
    /// poll(2) on the device descriptor failed
    #[error("DRM poll error: {0}")]
    PollFailed(#[source] std::io::Error),

    /// The device descriptor reported hangup or error
    #[error("DRM poll hup or error")]
    HangUp,

    /// The wait timed out before the flip completed
    #[error("Page flip did not complete, frame dropped")]
    FrameDropped,
}

/// Main error type for kmsdrm operations
#[derive(Debug, Error)]
pub enum KmsError {
    /// Discovery found no usable mode-setting device
    #[error("No usable KMS/DRM device found")]
    DeviceUnavailable,

    /// The driver has not been initialized, or has already quit
    #[error("Video driver is not initialized")]
    NotInitialized,

    /// A resource, connector, encoder or CRTC query returned nothing
    #[error("Resource query failed: {0}")]
    ResourceQuery(String),

    /// Connector/encoder/CRTC negotiation failed
    #[error("Display negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Memory or kernel object creation failed
    #[error("Allocation failed: {0}")]
    Allocation(String),

    /// Waiting for a page flip failed
    #[error("Presentation failed: {0}")]
    Presentation(#[from] PresentationError),

    /// A second flip was submitted while one is still pending
    #[error("A page flip is already pending for this window")]
    FlipAlreadyPending,

    /// Rendering or graphics-context surface creation failed
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unsupported operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<KmsError>,
    },
}

impl KmsError {
    /// Create a resource query error
    pub fn resource_query(msg: impl Into<String>) -> Self {
        Self::ResourceQuery(msg.into())
    }

    /// Create an allocation error
    pub fn allocation(msg: impl Into<String>) -> Self {
        Self::Allocation(msg.into())
    }

    /// Create a surface creation error
    pub fn surface_creation(msg: impl Into<String>) -> Self {
        Self::SurfaceCreation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with all context layers stripped
    pub fn root(&self) -> &KmsError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short remediation hint for the user, if there is one
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::DeviceUnavailable => Some(
                "Check that /dev/dri/card* exists and that you are in the 'video' group",
            ),
            Self::NotInitialized => Some("Call init() before creating windows"),
            Self::Negotiation(NegotiationError::NoActiveConnector) => {
                Some("Connect a display and make sure it is powered on")
            }
            Self::Negotiation(_) => {
                Some("Another display server may own the outputs; run from a bare VT")
            }
            Self::Presentation(_) | Self::FlipAlreadyPending => {
                Some("Frames are presented faster than the display refreshes")
            }
            Self::Config(_) => Some("Check your config.toml and KMSDRM_* environment hints"),
            _ => None,
        }
    }

    /// Whether the driver remains usable after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::Presentation(_) | Self::FlipAlreadyPending | Self::Config(_) | Self::Unsupported(_)
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl From<toml::de::Error> for KmsError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
