//! [`DeviceBinding`] backed by the vendor acquisition library.
//!
//! The library keeps one process-global camera handle, so only one
//! `SdkBinding` should exist at a time.

#![allow(unsafe_code)]

use crate::binding::{DeviceBinding, InfoBuffer};
use crate::frame::HEADER_LEN;
use std::ffi::CStr;
use std::marker::PhantomData;
use tachyon_sys as sys;

/// Binding to `libtachyon_acq` / `Tachyon_acq.dll`.
#[derive(Debug, Default)]
pub struct SdkBinding {
    // Not Sync: the library has no internal locking.
    _not_sync: PhantomData<std::cell::Cell<()>>,
}

impl SdkBinding {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeviceBinding for SdkBinding {
    fn open_camera(&mut self) -> i32 {
        // SAFETY: no arguments; the library owns the USB handle.
        unsafe { sys::open_camera() }
    }

    fn set_active_camera(&mut self, index: i32) -> i32 {
        // SAFETY: plain integer argument.
        unsafe { sys::set_active_camera(index) }
    }

    fn camera_info(
        &mut self,
        description: &mut InfoBuffer,
        serial_number: &mut InfoBuffer,
        manufacturer: &mut InfoBuffer,
    ) -> i32 {
        // SAFETY: each buffer is INFO_BUFFER_LEN bytes, the size the library
        // writes into, and lives for the duration of the call.
        unsafe {
            sys::get_camera_info(
                description.as_mut_ptr().cast(),
                serial_number.as_mut_ptr().cast(),
                manufacturer.as_mut_ptr().cast(),
            )
        }
    }

    fn close_camera(&mut self) -> i32 {
        // SAFETY: no arguments.
        unsafe { sys::close_camera() }
    }

    fn reset_camera(&mut self) -> i32 {
        // SAFETY: no arguments.
        unsafe { sys::reset_camera() }
    }

    fn usb_error(&mut self) -> Option<String> {
        // SAFETY: the library returns either NULL or a pointer to a
        // NUL-terminated string it owns; we copy it out immediately.
        unsafe {
            let ptr = sys::usb_error();
            if ptr.is_null() {
                return None;
            }
            let message = CStr::from_ptr(ptr).to_string_lossy().into_owned();
            (!message.is_empty()).then_some(message)
        }
    }

    fn start(&mut self) -> i32 {
        // SAFETY: no arguments.
        unsafe { sys::start() }
    }

    fn stop(&mut self) -> i32 {
        // SAFETY: no arguments.
        unsafe { sys::stop() }
    }

    fn read_frame(&mut self, header: &mut [u8; HEADER_LEN], pixels: &mut [i16]) -> i32 {
        // SAFETY: header is exactly HEADER_LEN bytes. The session sizes
        // `pixels` to the model's pixel count, which is what the library
        // writes for the camera it detected.
        unsafe { sys::read_frame(header.as_mut_ptr(), pixels.as_mut_ptr()) }
    }

    fn calibrate(&mut self, target: i32, auto_off: i32) -> i32 {
        // SAFETY: plain integer arguments.
        unsafe { sys::calibrate(target, auto_off) }
    }

    fn stop_calibration(&mut self) -> i32 {
        // SAFETY: no arguments.
        unsafe { sys::stop_calibration() }
    }

    fn close_shutter(&mut self) -> i32 {
        // SAFETY: no arguments.
        unsafe { sys::close_shutter() }
    }

    fn open_shutter(&mut self) -> i32 {
        // SAFETY: no arguments.
        unsafe { sys::open_shutter() }
    }

    fn set_integration_time(&mut self, seconds: f32) -> i32 {
        // SAFETY: plain float argument.
        unsafe { sys::set_integration_time(seconds) }
    }

    fn set_wait_time(&mut self, seconds: f32) -> i32 {
        // SAFETY: plain float argument.
        unsafe { sys::set_wait_time(seconds) }
    }

    fn set_bias(&mut self, volts: f32) -> i32 {
        // SAFETY: plain float argument.
        unsafe { sys::set_bias(volts) }
    }

    fn set_vth(&mut self, value: i32) -> i32 {
        // SAFETY: plain integer argument.
        unsafe { sys::set_Vth(value) }
    }

    fn set_timeout(&mut self, value: i32) -> i32 {
        // SAFETY: plain integer argument.
        unsafe { sys::set_timeout(value) }
    }
}
