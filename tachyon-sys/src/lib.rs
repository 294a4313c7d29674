//! Low-level FFI bindings for the NIT Tachyon acquisition library.
//!
//! The library drives a single USB camera through process-global state: every
//! call below acts on the "active" camera selected by [`set_active_camera`]
//! (camera 0 after [`open_camera`]).
//!
//! # Return codes
//!
//! Every function returns a C `int`. Negative values signal failure.
//! [`READ_TIMEOUT`] is the code [`read_frame`] returns when no frame arrived
//! before the configured timeout. The configuration setters return the value
//! the camera actually applied.
//!
//! # Safety
//!
//! All functions are `unsafe` direct FFI calls. The library is not
//! thread-safe; callers must serialize access. For a safe wrapper use the
//! `tachyon-daq` crate.
//!
//! # Features
//!
//! - `tachyon-sdk`: link against `libtachyon_acq`. Without it the
//!   declarations still compile but nothing is linked, so they must not be
//!   called.

#![allow(non_snake_case)]

use std::os::raw::{c_char, c_float, c_int};

/// Size of each string buffer passed to [`get_camera_info`].
pub const INFO_BUFFER_LEN: usize = 256;

/// Size of the frame header buffer passed to [`read_frame`].
pub const HEADER_LEN: usize = 64;

/// `read_frame` status for "timed out waiting for images".
pub const READ_TIMEOUT: c_int = -116;

extern "C" {
    // Camera management

    /// Opens the USB link. Returns the number of cameras found.
    pub fn open_camera() -> c_int;
    /// Selects which of the detected cameras subsequent calls address.
    pub fn set_active_camera(index: c_int) -> c_int;
    /// Fills three caller-owned buffers of [`INFO_BUFFER_LEN`] bytes with
    /// NUL-terminated description, serial number and manufacturer strings.
    pub fn get_camera_info(
        description: *mut c_char,
        serial_number: *mut c_char,
        manufacturer: *mut c_char,
    ) -> c_int;
    pub fn close_camera() -> c_int;
    pub fn reset_camera() -> c_int;
    /// Last USB error message, owned by the library.
    pub fn usb_error() -> *const c_char;

    // Camera operation

    pub fn start() -> c_int;
    pub fn stop() -> c_int;
    /// Reads one frame into a [`HEADER_LEN`]-byte header buffer and a pixel
    /// buffer sized for the camera model (1024 or 6400 samples).
    pub fn read_frame(header: *mut u8, image: *mut i16) -> c_int;
    pub fn calibrate(target: c_int, auto_off: c_int) -> c_int;
    pub fn stop_calibration() -> c_int;
    pub fn close_shutter() -> c_int;
    pub fn open_shutter() -> c_int;

    // Camera configuration

    pub fn set_integration_time(seconds: c_float) -> c_int;
    pub fn set_wait_time(seconds: c_float) -> c_int;
    pub fn set_bias(volts: c_float) -> c_int;
    pub fn set_Vth(value: c_int) -> c_int;
    pub fn set_timeout(value: c_int) -> c_int;
}
