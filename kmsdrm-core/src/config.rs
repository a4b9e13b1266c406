//! Driver configuration
//!
//! Settings come from defaults, an optional read-only TOML file, and
//! `KMSDRM_*` environment hints, in that order of precedence (lowest first).
//! Nothing is ever written back.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::device::{CARD_PREFIX, DRI_PATH, DeviceEnumerator};
use crate::error::{KmsError, Result};

/// Environment hint: wait for vsync right after queueing each flip
pub const HINT_DOUBLE_BUFFER: &str = "KMSDRM_DOUBLE_BUFFER";

/// Environment hint: device index to open
pub const HINT_DEVICE_INDEX: &str = "KMSDRM_DEVICE_INDEX";

/// Environment hint: directory holding device nodes
pub const HINT_DEVICE_DIR: &str = "KMSDRM_DEVICE_DIR";

/// Driver settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Directory holding device nodes
    pub device_dir: PathBuf,

    /// Device node name prefix
    pub device_prefix: String,

    /// Device to open; `None` selects the first usable one
    pub device_index: Option<u32>,

    /// Wait for each flip right after queueing it (lower latency, less throughput)
    pub double_buffer: bool,

    /// Ask the allocator whether the surface format is supported before creating it
    pub check_format: bool,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from(DRI_PATH),
            device_prefix: CARD_PREFIX.to_string(),
            device_index: None,
            double_buffer: false,
            check_format: true,
        }
    }
}

/// Parse a boolean hint the way hints are usually written
///
/// Returns `None` for values that are not recognizably true or false.
pub fn parse_bool_hint(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl DriverConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("kmsdrm").join("config.toml")
        } else {
            PathBuf::from("/etc/kmsdrm/config.toml")
        }
    }

    /// Defaults with environment hints applied
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Parse a TOML fragment
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: DriverConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from a file, falling back to defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| KmsError::config(format!("Failed to read config file: {}", e)))?;
        let config = Self::from_toml_str(&content)
            .map_err(|e| e.with_context(format!("Failed to parse {}", path.display())))?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load the default config file, logging a warning and using defaults on error
    pub fn load_or_default() -> Self {
        match Self::load_from(&Self::default_path()) {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Apply `KMSDRM_*` environment hints
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply hints looked up through `lookup`
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(HINT_DOUBLE_BUFFER) {
            match parse_bool_hint(&value) {
                Some(enabled) => self.double_buffer = enabled,
                None => warn!("Ignoring {}={:?}: not a boolean", HINT_DOUBLE_BUFFER, value),
            }
        }

        if let Some(value) = lookup(HINT_DEVICE_INDEX) {
            match value.trim().parse::<u32>() {
                Ok(index) => self.device_index = Some(index),
                Err(_) => warn!("Ignoring {}={:?}: not an index", HINT_DEVICE_INDEX, value),
            }
        }

        if let Some(value) = lookup(HINT_DEVICE_DIR) {
            if !value.is_empty() {
                self.device_dir = PathBuf::from(value);
            }
        }

        self
    }

    /// Enumerator for the configured device directory
    pub fn enumerator(&self) -> DeviceEnumerator {
        DeviceEnumerator::new(&self.device_dir, &self.device_prefix)
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# kmsdrm configuration
# Every setting can also be given as a KMSDRM_* environment hint.

# Directory holding DRM device nodes
device_dir = "/dev/dri/"

# Device node name prefix
device_prefix = "card"

# Device to open (omit to use the first usable device)
# device_index = 0

# Wait for vsync right after queueing each flip (KMSDRM_DOUBLE_BUFFER)
double_buffer = false

# Check surface format support before creating the rendering surface
check_format = true
"#
    .to_string()
}
