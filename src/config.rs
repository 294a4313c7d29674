//! Camera configuration using Figment.
//!
//! Configuration is loaded from:
//! 1. A YAML file (`tachyon.yml` by default)
//! 2. Environment variables prefixed with `TACHYON_` (`__` separates levels)
//!
//! Only the `configuration` section is required; it carries the five scalars
//! pushed to the camera. Everything else has defaults.
//!
//! # Example
//! ```yaml
//! configuration:
//!   int_time: 0.0001
//!   wait_time: 0.0001
//!   bias: 2.0
//!   vth_value: 127
//!   timeout: 5
//! camera:
//!   default_model: "1024"
//! ```
//!
//! ```no_run
//! use tachyon_daq::config::TachyonConfig;
//!
//! let config = TachyonConfig::load_from("tachyon.yml")?;
//! println!("integration time: {} s", config.configuration.int_time);
//! # Ok::<(), tachyon_daq::TachyonError>(())
//! ```

use crate::calibration::CalibrationSchedule;
use crate::error::{Result, TachyonError};
use crate::frame::CameraModel;
use figment::{
    providers::{Env, Format, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "tachyon.yml";

/// The five values pushed to the camera by `Session::configure`.
///
/// Not range-checked: the camera clamps or rejects out-of-range values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraConfiguration {
    /// Integration time in seconds.
    pub int_time: f32,
    /// Wait time between frames in seconds.
    pub wait_time: f32,
    /// Detector bias.
    pub bias: f32,
    /// Threshold voltage.
    pub vth_value: i32,
    /// Read timeout as understood by the library.
    pub timeout: i32,
}

/// Values the camera reported back after configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedConfiguration {
    pub integration_time: i32,
    pub wait_time: i32,
    pub bias: i32,
    pub vth_value: i32,
    pub timeout: i32,
}

/// Top-level file layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TachyonConfig {
    pub configuration: CameraConfiguration,
    #[serde(default)]
    pub camera: CameraSection,
    #[serde(default)]
    pub firmware: FirmwareSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Model selection and calibration timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraSection {
    /// Model used when the identity string is not recognised.
    #[serde(default)]
    pub default_model: CameraModel,
    /// Index passed to `set_active_camera` after opening, if set.
    #[serde(default)]
    pub active_camera: Option<i32>,
    #[serde(default)]
    pub calibration: CalibrationSchedule,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            default_model: CameraModel::default(),
            active_camera: None,
            calibration: CalibrationSchedule::default(),
        }
    }
}

/// External FPGA firmware loader invoked for 1024-pixel cameras.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareSection {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_java")]
    pub java: PathBuf,
    #[serde(default = "default_jar")]
    pub jar: PathBuf,
    #[serde(default = "default_bitstream")]
    pub bitstream: PathBuf,
}

impl Default for FirmwareSection {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            java: default_java(),
            jar: default_jar(),
            bitstream: default_bitstream(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_enabled() -> bool {
    true
}

fn default_java() -> PathBuf {
    PathBuf::from("java")
}

fn default_jar() -> PathBuf {
    PathBuf::from("FWLoader.jar")
}

fn default_bitstream() -> PathBuf {
    PathBuf::from("nit_tachyon_32_HS.bit")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl TachyonConfig {
    /// Load `tachyon.yml` from the working directory plus environment
    /// overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from a specific file path.
    ///
    /// Environment variables override file values, e.g.
    /// `TACHYON_CONFIGURATION__INT_TIME=0.0002`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TachyonError::Config {
                message: format!("Config file not found: {}", path.display()),
            });
        }

        let config: Self = Figment::new()
            .merge(Yaml::file(path))
            .merge(Env::prefixed("TACHYON_").split("__"))
            .extract()?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded camera configuration");
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(TachyonError::Config {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(TachyonError::Config {
                message: format!(
                    "Invalid log format '{}'. Must be one of: {}",
                    self.logging.format,
                    valid_formats.join(", ")
                ),
            });
        }

        self.camera.calibration.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".yml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_minimal_file() {
        let file = write_config(
            "configuration:\n  int_time: 0.0001\n  wait_time: 0.0002\n  bias: 2.5\n  vth_value: 127\n  timeout: 5\n",
        );
        let config = TachyonConfig::load_from(file.path()).unwrap();

        assert_eq!(config.configuration.int_time, 0.0001);
        assert_eq!(config.configuration.wait_time, 0.0002);
        assert_eq!(config.configuration.bias, 2.5);
        assert_eq!(config.configuration.vth_value, 127);
        assert_eq!(config.configuration.timeout, 5);
        assert_eq!(config.camera.default_model, CameraModel::Tachyon1024);
        assert_eq!(config.camera.calibration, CalibrationSchedule::default());
        assert_eq!(config.firmware.jar, PathBuf::from("FWLoader.jar"));
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn loads_optional_sections() {
        let file = write_config(
            "configuration:\n  int_time: 0.001\n  wait_time: 0.001\n  bias: 1.0\n  vth_value: 10\n  timeout: 2\ncamera:\n  default_model: \"6400\"\n  active_camera: 1\nfirmware:\n  enabled: false\nlogging:\n  level: debug\n",
        );
        let config = TachyonConfig::load_from(file.path()).unwrap();
        assert_eq!(config.camera.default_model, CameraModel::Tachyon6400);
        assert_eq!(config.camera.active_camera, Some(1));
        assert!(!config.firmware.enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn missing_configuration_section_is_an_error() {
        let file = write_config("logging:\n  level: info\n");
        let err = TachyonConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, TachyonError::Config { .. }));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = TachyonConfig::load_from("/definitely/not/here/tachyon.yml").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn invalid_log_level_fails_validation() {
        let file = write_config(
            "configuration:\n  int_time: 0.001\n  wait_time: 0.001\n  bias: 1.0\n  vth_value: 10\n  timeout: 2\nlogging:\n  level: loud\n",
        );
        let err = TachyonConfig::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn out_of_order_calibration_schedule_fails_validation() {
        let file = write_config(
            "configuration:\n  int_time: 0.001\n  wait_time: 0.001\n  bias: 1.0\n  vth_value: 10\n  timeout: 2\ncamera:\n  calibration:\n    iterations: 50\n    close_shutter_at: 10\n    start_calibration_at: 5\n    stop_calibration_at: 30\n    open_shutter_at: 40\n",
        );
        let err = TachyonConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, TachyonError::InvalidSchedule { .. }));
    }
}
