//! Error types for Tachyon camera operations.
//!
//! Every hardware call in the acquisition library reports failure through a
//! negative return code. [`TachyonError`] turns those codes into typed
//! variants so callers can tell a recoverable condition (camera absent or
//! busy, a read timeout) apart from an integration bug (calling into a
//! session that was never opened).
//!
//! ## Error Categories
//!
//! 1. **State violations** - `NotConnected`, `CalibrationInProgress`
//!    - The caller invoked an operation the session state does not allow.
//!    - These fail fast and never reach the device binding.
//!
//! 2. **Hardware failures** - `OpenFailed`, `CloseFailed`, `StreamStartFailed`,
//!    `StreamStopFailed`, `ShutterFailed`, `CalibrationFailed`, ...
//!    - Carry the raw code reported by the binding.
//!    - No retries happen inside the crate; the caller decides.
//!
//! 3. **Acquisition failures** - `Timeout`, `AcquisitionError`
//!    - A read produced no frame. `Timeout` is the dedicated `-116` code.

use thiserror::Error;

/// Result type alias for Tachyon operations.
pub type Result<T> = std::result::Result<T, TachyonError>;

/// Status code returned by `read_frame` when no frame arrived in time.
pub const READ_TIMEOUT_CODE: i32 = -116;

/// Errors that can occur when driving a Tachyon camera.
#[derive(Error, Debug)]
pub enum TachyonError {
    /// Operation requires an open session but the session is disconnected.
    #[error("Cannot {operation}: camera session is not connected")]
    NotConnected { operation: &'static str },

    /// The library reported zero (or a negative number of) cameras.
    #[error("Failed to open camera: library reported {count} camera(s)")]
    OpenFailed { count: i32 },

    /// Closing the USB link failed; the session is still connected.
    #[error("Failed to close camera (code {code})")]
    CloseFailed { code: i32 },

    /// `reset_camera` returned a failure code.
    #[error("Failed to reset camera (code {code})")]
    ResetFailed { code: i32 },

    /// `set_active_camera` rejected the requested index.
    #[error("Failed to select camera {index} (code {code})")]
    SelectFailed { index: i32, code: i32 },

    /// Device start returned a non-zero code; the shutter was not touched.
    #[error("Failed to start streaming (code {code})")]
    StreamStartFailed { code: i32 },

    /// Device stop returned a negative code.
    #[error("Failed to stop streaming (code {code})")]
    StreamStopFailed { code: i32 },

    /// Opening or closing the mechanical shutter failed.
    #[error("Failed to {action} shutter (code {code})")]
    ShutterFailed { action: &'static str, code: i32 },

    /// Starting or stopping the offset calibration failed.
    #[error("Calibration {action} failed (code {code})")]
    CalibrationFailed { action: &'static str, code: i32 },

    /// A frame read timed out waiting for an image (code -116).
    #[error("Timed out waiting for images")]
    Timeout,

    /// A frame read failed with any other negative code.
    #[error("Frame acquisition failed (code {code})")]
    AcquisitionError { code: i32 },

    /// Normal streaming was requested while the shutter is closed for a
    /// manual calibration.
    #[error("Manual calibration in progress; stop it before streaming")]
    CalibrationInProgress,

    /// A calibration schedule whose trigger points are out of order or out
    /// of range.
    #[error("Invalid calibration schedule: {message}")]
    InvalidSchedule { message: String },

    /// Configuration file could not be loaded or failed validation.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The external firmware loader could not be launched.
    #[error("Firmware loader error: {message}")]
    Firmware { message: String },

    /// A blocking task on the async runtime panicked or was cancelled.
    #[error("Background task failed: {message}")]
    Task { message: String },
}

impl TachyonError {
    /// Classify a negative `read_frame` status code.
    pub fn from_read_code(code: i32) -> Self {
        if code == READ_TIMEOUT_CODE {
            Self::Timeout
        } else {
            Self::AcquisitionError { code }
        }
    }

    /// Check if this is a read timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Check if this error came from a frame read (timeout or other failure).
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Timeout | Self::AcquisitionError { .. })
    }

    /// Check if the session was simply not open.
    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::NotConnected { .. })
    }
}

impl From<figment::Error> for TachyonError {
    fn from(err: figment::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for TachyonError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task {
            message: err.to_string(),
        }
    }
}
