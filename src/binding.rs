//! Device binding: the primitive operations of the vendor acquisition library.
//!
//! [`DeviceBinding`] is the seam between the session state machine and the
//! hardware. Each method maps one-to-one onto a library call and returns the
//! library's raw status code, so the session owns all interpretation of those
//! codes (see [`crate::error::TachyonError`]).
//!
//! Implementations:
//! - [`crate::ffi::SdkBinding`] (feature `tachyon_sdk`): the real library
//! - [`crate::mock::MockBinding`]: simulated camera for tests and dry runs

use crate::frame::HEADER_LEN;
use serde::{Deserialize, Serialize};
use std::ffi::CStr;

/// Size of each identity string buffer filled by `camera_info`.
pub const INFO_BUFFER_LEN: usize = 256;

/// Fixed-size identity buffer as handed to the library.
pub type InfoBuffer = [u8; INFO_BUFFER_LEN];

/// Blocking primitive operations against a single physical camera.
///
/// Return-code contract: negative values mean failure. `read_frame` returns
/// `-116` on timeout. Configuration setters return the value the camera
/// actually applied, which may differ from the request.
pub trait DeviceBinding: Send {
    /// Open the USB link. Returns the number of cameras detected.
    fn open_camera(&mut self) -> i32;

    /// Select which detected camera later calls address.
    fn set_active_camera(&mut self, index: i32) -> i32;

    /// Fill description, serial number and manufacturer buffers.
    fn camera_info(
        &mut self,
        description: &mut InfoBuffer,
        serial_number: &mut InfoBuffer,
        manufacturer: &mut InfoBuffer,
    ) -> i32;

    fn close_camera(&mut self) -> i32;
    fn reset_camera(&mut self) -> i32;

    /// Last USB error message reported by the library, if any.
    fn usb_error(&mut self) -> Option<String>;

    fn start(&mut self) -> i32;
    fn stop(&mut self) -> i32;

    /// Read one frame. `pixels` holds exactly `model` samples.
    fn read_frame(&mut self, header: &mut [u8; HEADER_LEN], pixels: &mut [i16]) -> i32;

    fn calibrate(&mut self, target: i32, auto_off: i32) -> i32;
    fn stop_calibration(&mut self) -> i32;
    fn close_shutter(&mut self) -> i32;
    fn open_shutter(&mut self) -> i32;

    fn set_integration_time(&mut self, seconds: f32) -> i32;
    fn set_wait_time(&mut self, seconds: f32) -> i32;
    fn set_bias(&mut self, volts: f32) -> i32;
    fn set_vth(&mut self, value: i32) -> i32;
    fn set_timeout(&mut self, value: i32) -> i32;
}

impl<B: DeviceBinding + ?Sized> DeviceBinding for Box<B> {
    fn open_camera(&mut self) -> i32 {
        (**self).open_camera()
    }
    fn set_active_camera(&mut self, index: i32) -> i32 {
        (**self).set_active_camera(index)
    }
    fn camera_info(
        &mut self,
        description: &mut InfoBuffer,
        serial_number: &mut InfoBuffer,
        manufacturer: &mut InfoBuffer,
    ) -> i32 {
        (**self).camera_info(description, serial_number, manufacturer)
    }
    fn close_camera(&mut self) -> i32 {
        (**self).close_camera()
    }
    fn reset_camera(&mut self) -> i32 {
        (**self).reset_camera()
    }
    fn usb_error(&mut self) -> Option<String> {
        (**self).usb_error()
    }
    fn start(&mut self) -> i32 {
        (**self).start()
    }
    fn stop(&mut self) -> i32 {
        (**self).stop()
    }
    fn read_frame(&mut self, header: &mut [u8; HEADER_LEN], pixels: &mut [i16]) -> i32 {
        (**self).read_frame(header, pixels)
    }
    fn calibrate(&mut self, target: i32, auto_off: i32) -> i32 {
        (**self).calibrate(target, auto_off)
    }
    fn stop_calibration(&mut self) -> i32 {
        (**self).stop_calibration()
    }
    fn close_shutter(&mut self) -> i32 {
        (**self).close_shutter()
    }
    fn open_shutter(&mut self) -> i32 {
        (**self).open_shutter()
    }
    fn set_integration_time(&mut self, seconds: f32) -> i32 {
        (**self).set_integration_time(seconds)
    }
    fn set_wait_time(&mut self, seconds: f32) -> i32 {
        (**self).set_wait_time(seconds)
    }
    fn set_bias(&mut self, volts: f32) -> i32 {
        (**self).set_bias(volts)
    }
    fn set_vth(&mut self, value: i32) -> i32 {
        (**self).set_vth(value)
    }
    fn set_timeout(&mut self, value: i32) -> i32 {
        (**self).set_timeout(value)
    }
}

/// Identity reported by the camera right after opening.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraIdentity {
    pub description: String,
    pub serial_number: String,
    pub manufacturer: String,
}

impl CameraIdentity {
    /// Build from the three NUL-terminated buffers filled by the library.
    pub fn from_buffers(
        description: &InfoBuffer,
        serial_number: &InfoBuffer,
        manufacturer: &InfoBuffer,
    ) -> Self {
        Self {
            description: buffer_to_string(description),
            serial_number: buffer_to_string(serial_number),
            manufacturer: buffer_to_string(manufacturer),
        }
    }
}

/// Text up to the first NUL; the whole buffer if the library forgot one.
pub(crate) fn buffer_to_string(buf: &[u8]) -> String {
    match CStr::from_bytes_until_nul(buf) {
        Ok(s) => s.to_string_lossy().into_owned(),
        Err(_) => String::from_utf8_lossy(buf).into_owned(),
    }
}

/// Copy `text` into a fixed buffer, truncating and NUL-terminating.
pub(crate) fn write_c_string(buf: &mut InfoBuffer, text: &str) {
    buf.fill(0);
    let n = text.len().min(INFO_BUFFER_LEN - 1);
    buf[..n].copy_from_slice(&text.as_bytes()[..n]);
}
