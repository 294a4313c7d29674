//! # Tachyon Camera Driver
//!
//! Driver for NIT Tachyon infrared focal-plane-array cameras. It sequences
//! the vendor acquisition library: opening the USB link, pushing exposure and
//! bias settings, running the dark-current offset calibration and streaming
//! header + pixel frames.
//!
//! ## Crate Structure
//!
//! - **`binding`**: The [`DeviceBinding`] trait, one method per library call.
//! - **`ffi`**: [`DeviceBinding`] over the real library (feature `tachyon_sdk`).
//! - **`mock`**: Simulated camera with a shared call log, for tests and dry runs.
//! - **`frame`**: Decodes the 64-byte header and reshapes the pixel buffer.
//! - **`session`**: The [`Session`] state machine and its settle delays.
//! - **`calibration`**: Scripted and manual offset calibration.
//! - **`acquisition`**: Bounded or unbounded read loop with failure policy.
//! - **`bootstrap`**: Open, identify, upload firmware, configure.
//! - **`firmware`**: External firmware loader strategy.
//! - **`driver`**: Async facade that streams frames on a broadcast channel.
//! - **`config`**: Figment-based YAML/env configuration.
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`timing`**: Injectable settle timer.
//! - **`error`**: [`TachyonError`] and the crate [`Result`].

pub mod acquisition;
pub mod binding;
pub mod bootstrap;
pub mod calibration;
pub mod config;
pub mod driver;
pub mod error;
#[cfg(feature = "tachyon_sdk")]
pub mod ffi;
pub mod firmware;
pub mod frame;
pub mod logging;
pub mod mock;
pub mod session;
pub mod timing;

pub use binding::{CameraIdentity, DeviceBinding};
pub use config::{AppliedConfiguration, CameraConfiguration, TachyonConfig};
pub use error::{Result, TachyonError};
pub use frame::{CameraModel, Frame, FrameHeader, PixelGrid};
pub use session::{Session, SessionState};
