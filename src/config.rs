//! Runtime configuration: storage paths, capture behavior and recording
//! defaults, loaded from a TOML file.

use crate::errors::CaptureError;
use crate::snapshot::SnapshotFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewfinderConfig {
    pub storage: StorageConfig,
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
}

/// Where captures land on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for snapshots and recordings.
    pub output_directory: String,
    /// Encoding for still snapshots.
    pub snapshot_format: SnapshotFormat,
}

/// Capture/preview behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Seconds between hot-plug polling scans.
    pub device_poll_secs: u64,
    /// Rebind automatically when the bound device reappears.
    pub auto_rebind: bool,
}

/// Recording defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Bits per pixel-of-frame-area used to derive the output bitrate.
    pub bitrate_per_pixel: u32,
    /// Enable fast-start layout for web playback.
    pub fast_start: bool,
}

impl Default for ViewfinderConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                output_directory: "./captures".to_string(),
                snapshot_format: SnapshotFormat::Png,
            },
            capture: CaptureConfig {
                device_poll_secs: 2,
                auto_rebind: true,
            },
            recording: RecordingConfig {
                bitrate_per_pixel: 20,
                fast_start: true,
            },
        }
    }
}

impl ViewfinderConfig {
    /// Load configuration from a TOML file, falling back to defaults
    /// when the file does not exist.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CaptureError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("config file not found at {path:?}, using defaults");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: ViewfinderConfig = toml::from_str(&contents).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("failed to parse config file: {e}"))
        })?;

        log::info!("loaded configuration from {path:?}");
        Ok(config)
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CaptureError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            CaptureError::DeviceUnavailable(format!("failed to serialize config: {e}"))
        })?;
        fs::write(path, toml_string)?;

        log::info!("saved configuration to {path:?}");
        Ok(())
    }

    /// Default config file path.
    pub fn default_path() -> PathBuf {
        PathBuf::from("viewfinder.toml")
    }

    /// Load from the default location or fall back to defaults.
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("failed to load config, using defaults: {e}");
            Self::default()
        })
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.storage.output_directory.trim().is_empty() {
            return Err("output directory must not be empty".to_string());
        }
        if self.capture.device_poll_secs == 0 || self.capture.device_poll_secs > 3600 {
            return Err("device poll interval must be 1-3600 seconds".to_string());
        }
        if self.recording.bitrate_per_pixel == 0 || self.recording.bitrate_per_pixel > 1000 {
            return Err("bitrate per pixel must be 1-1000".to_string());
        }
        Ok(())
    }

    /// Snapshot directory as a path.
    pub fn snapshot_directory(&self) -> PathBuf {
        PathBuf::from(&self.storage.output_directory)
    }
}
