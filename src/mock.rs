//! Simulated Tachyon camera.
//!
//! [`MockBinding`] implements [`DeviceBinding`] without hardware. It keeps a
//! shared [`CallLog`] so tests can assert on the exact sequence of library
//! calls after the binding has been moved into a session.
//!
//! Behaviour:
//! - Reads succeed while streaming; after `stop` a few residual frames are
//!   still delivered, then every read times out (`-116`).
//! - Frames carry a moving ramp `((x + y + n) % 4096) + 100`, or a flat dark
//!   level while the shutter is closed.
//! - Setters echo the request in device units: times in microseconds, bias
//!   in millivolts, Vth clamped to `0..=255`.

use crate::binding::{write_c_string, DeviceBinding, InfoBuffer};
use crate::error::READ_TIMEOUT_CODE;
use crate::frame::{CameraModel, HEADER_LEN};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// `header_id` stamped on every simulated frame.
pub const MOCK_HEADER_ID: u32 = 0x4E49_5401;
/// Pixel value reported while the shutter is closed.
pub const DARK_LEVEL: i16 = 100;
/// Simulated microseconds between frames.
const FRAME_PERIOD_US: u64 = 1_000;

/// One library call as seen by the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum BindingCall {
    OpenCamera,
    SetActiveCamera(i32),
    CameraInfo,
    CloseCamera,
    ResetCamera,
    UsbError,
    Start,
    Stop,
    ReadFrame,
    Calibrate { target: i32, auto_off: i32 },
    StopCalibration,
    CloseShutter,
    OpenShutter,
    SetIntegrationTime(f32),
    SetWaitTime(f32),
    SetBias(f32),
    SetVth(i32),
    SetTimeout(i32),
}

/// Shared, cloneable record of binding calls.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<BindingCall>>>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: BindingCall) {
        self.calls.lock().push(call);
    }

    /// Snapshot of every call so far.
    pub fn calls(&self) -> Vec<BindingCall> {
        self.calls.lock().clone()
    }

    pub fn count(&self, call: &BindingCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }

    pub fn reads(&self) -> usize {
        self.count(&BindingCall::ReadFrame)
    }

    /// Calls other than `ReadFrame`, in order.
    pub fn control_calls(&self) -> Vec<BindingCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| **c != BindingCall::ReadFrame)
            .cloned()
            .collect()
    }

    /// Number of reads issued before the first occurrence of `call`.
    pub fn reads_before(&self, call: &BindingCall) -> Option<usize> {
        let calls = self.calls.lock();
        let at = calls.iter().position(|c| c == call)?;
        Some(
            calls[..at]
                .iter()
                .filter(|c| **c == BindingCall::ReadFrame)
                .count(),
        )
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// Simulated camera implementing [`DeviceBinding`].
#[derive(Debug)]
pub struct MockBinding {
    log: CallLog,
    model: CameraModel,
    description: String,
    serial_number: String,
    manufacturer: String,
    camera_count: i32,
    close_code: i32,
    reset_code: i32,
    start_code: i32,
    stop_code: i32,
    calibrate_code: i32,
    stop_calibration_code: i32,
    open_shutter_code: i32,
    close_shutter_code: i32,
    usb_error: Option<String>,
    read_codes: VecDeque<i32>,
    residual_frames: usize,
    pending_frames: usize,
    streaming: bool,
    shutter_open: bool,
    frame_number: u32,
    drop_at: Option<(u32, u32)>,
    active_camera: i32,
}

impl MockBinding {
    /// A healthy camera of the given model with two stale frames buffered.
    pub fn new(model: CameraModel) -> Self {
        let description = match model {
            CameraModel::Tachyon1024 => CameraModel::DESCRIPTION_1024,
            CameraModel::Tachyon6400 => CameraModel::DESCRIPTION_6400,
        };
        Self {
            log: CallLog::new(),
            model,
            description: description.to_string(),
            serial_number: "MOCK-0001".to_string(),
            manufacturer: "NEW INFRARED TECHNOLOGIES".to_string(),
            camera_count: 1,
            close_code: 1,
            reset_code: 0,
            start_code: 0,
            stop_code: 0,
            calibrate_code: 0,
            stop_calibration_code: 0,
            open_shutter_code: 0,
            close_shutter_code: 0,
            usb_error: None,
            read_codes: VecDeque::new(),
            residual_frames: 3,
            pending_frames: 2,
            streaming: false,
            shutter_open: false,
            frame_number: 0,
            drop_at: None,
            active_camera: 0,
        }
    }

    /// Handle to the call log; stays valid after the mock is moved.
    pub fn call_log(&self) -> CallLog {
        self.log.clone()
    }

    pub fn model(&self) -> CameraModel {
        self.model
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn is_shutter_open(&self) -> bool {
        self.shutter_open
    }

    pub fn active_camera(&self) -> i32 {
        self.active_camera
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_camera_count(mut self, count: i32) -> Self {
        self.camera_count = count;
        self
    }

    pub fn with_close_code(mut self, code: i32) -> Self {
        self.close_code = code;
        self
    }

    pub fn with_reset_code(mut self, code: i32) -> Self {
        self.reset_code = code;
        self
    }

    pub fn with_start_code(mut self, code: i32) -> Self {
        self.start_code = code;
        self
    }

    pub fn with_stop_code(mut self, code: i32) -> Self {
        self.stop_code = code;
        self
    }

    pub fn with_calibrate_code(mut self, code: i32) -> Self {
        self.calibrate_code = code;
        self
    }

    pub fn with_stop_calibration_code(mut self, code: i32) -> Self {
        self.stop_calibration_code = code;
        self
    }

    /// A negative code leaves the shutter where it was.
    pub fn with_open_shutter_code(mut self, code: i32) -> Self {
        self.open_shutter_code = code;
        self
    }

    pub fn with_close_shutter_code(mut self, code: i32) -> Self {
        self.close_shutter_code = code;
        self
    }

    pub fn with_usb_error(mut self, message: impl Into<String>) -> Self {
        self.usb_error = Some(message.into());
        self
    }

    /// Frames still delivered after each `stop`.
    pub fn with_residual_frames(mut self, frames: usize) -> Self {
        self.residual_frames = frames;
        self
    }

    /// Frames sitting in the buffer before the first `start`.
    pub fn with_stale_frames(mut self, frames: usize) -> Self {
        self.pending_frames = frames;
        self
    }

    /// Status codes returned by the next reads, in order. Non-negative
    /// entries let the read proceed normally.
    pub fn with_read_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.read_codes.extend(codes);
        self
    }

    pub fn push_read_code(&mut self, code: i32) {
        self.read_codes.push_back(code);
    }

    /// Advance the firmware counter without delivering frames.
    pub fn skip_frames(&mut self, count: u32) {
        self.frame_number = self.frame_number.wrapping_add(count);
    }

    /// Lose `count` frames right after the one numbered `counter`.
    pub fn drop_frames_at(&mut self, counter: u32, count: u32) {
        self.drop_at = Some((counter, count));
    }

    fn fill_header(&self, header: &mut [u8; HEADER_LEN]) {
        let n = self.frame_number;
        let [c0, c1, c2, c3] = n.to_le_bytes();
        let micros = u64::from(n) * FRAME_PERIOD_US;

        header.fill(0);
        header[0..4].copy_from_slice(&MOCK_HEADER_ID.to_le_bytes());
        // Firmware stores the counter word-swapped.
        header[4..8].copy_from_slice(&[c2, c3, c0, c1]);
        header[8..12].copy_from_slice(&((micros >> 32) as u32).to_le_bytes());
        header[12..16].copy_from_slice(&(micros as u32).to_le_bytes());
        header[16..20].copy_from_slice(&(self.pending_frames as i32).to_le_bytes());
        header[28..32].copy_from_slice(&i32::from(self.shutter_open).to_le_bytes());
    }

    fn fill_pixels(&self, pixels: &mut [i16]) {
        if !self.shutter_open {
            pixels.fill(DARK_LEVEL);
            return;
        }
        let side = (pixels.len() as f64).sqrt() as usize;
        let n = self.frame_number as usize;
        for (i, p) in pixels.iter_mut().enumerate() {
            let (y, x) = (i / side.max(1), i % side.max(1));
            *p = (((x + y + n) % 4096) + 100) as i16;
        }
    }
}

impl DeviceBinding for MockBinding {
    fn open_camera(&mut self) -> i32 {
        self.log.push(BindingCall::OpenCamera);
        self.camera_count
    }

    fn set_active_camera(&mut self, index: i32) -> i32 {
        self.log.push(BindingCall::SetActiveCamera(index));
        if index < 0 || index >= self.camera_count {
            return -1;
        }
        self.active_camera = index;
        0
    }

    fn camera_info(
        &mut self,
        description: &mut InfoBuffer,
        serial_number: &mut InfoBuffer,
        manufacturer: &mut InfoBuffer,
    ) -> i32 {
        self.log.push(BindingCall::CameraInfo);
        write_c_string(description, &self.description);
        write_c_string(serial_number, &self.serial_number);
        write_c_string(manufacturer, &self.manufacturer);
        0
    }

    fn close_camera(&mut self) -> i32 {
        self.log.push(BindingCall::CloseCamera);
        if self.close_code > 0 {
            self.streaming = false;
        }
        self.close_code
    }

    fn reset_camera(&mut self) -> i32 {
        self.log.push(BindingCall::ResetCamera);
        if self.reset_code >= 0 {
            self.streaming = false;
            self.pending_frames = 0;
        }
        self.reset_code
    }

    fn usb_error(&mut self) -> Option<String> {
        self.log.push(BindingCall::UsbError);
        self.usb_error.clone()
    }

    fn start(&mut self) -> i32 {
        self.log.push(BindingCall::Start);
        if self.start_code == 0 {
            self.streaming = true;
        }
        self.start_code
    }

    fn stop(&mut self) -> i32 {
        self.log.push(BindingCall::Stop);
        if self.stop_code >= 0 && self.streaming {
            self.streaming = false;
            self.pending_frames = self.residual_frames;
        }
        self.stop_code
    }

    fn read_frame(&mut self, header: &mut [u8; HEADER_LEN], pixels: &mut [i16]) -> i32 {
        self.log.push(BindingCall::ReadFrame);

        if let Some(code) = self.read_codes.pop_front() {
            if code < 0 {
                return code;
            }
        }

        if !self.streaming {
            if self.pending_frames == 0 {
                return READ_TIMEOUT_CODE;
            }
            self.pending_frames -= 1;
        }

        if let Some((at, count)) = self.drop_at {
            if self.frame_number == at {
                self.skip_frames(count);
                self.drop_at = None;
            }
        }
        self.frame_number = self.frame_number.wrapping_add(1);
        self.fill_header(header);
        self.fill_pixels(pixels);
        0
    }

    fn calibrate(&mut self, target: i32, auto_off: i32) -> i32 {
        self.log.push(BindingCall::Calibrate { target, auto_off });
        self.calibrate_code
    }

    fn stop_calibration(&mut self) -> i32 {
        self.log.push(BindingCall::StopCalibration);
        self.stop_calibration_code
    }

    fn close_shutter(&mut self) -> i32 {
        self.log.push(BindingCall::CloseShutter);
        if self.close_shutter_code >= 0 {
            self.shutter_open = false;
        }
        self.close_shutter_code
    }

    fn open_shutter(&mut self) -> i32 {
        self.log.push(BindingCall::OpenShutter);
        if self.open_shutter_code >= 0 {
            self.shutter_open = true;
        }
        self.open_shutter_code
    }

    fn set_integration_time(&mut self, seconds: f32) -> i32 {
        self.log.push(BindingCall::SetIntegrationTime(seconds));
        (seconds * 1e6).round() as i32
    }

    fn set_wait_time(&mut self, seconds: f32) -> i32 {
        self.log.push(BindingCall::SetWaitTime(seconds));
        (seconds * 1e6).round() as i32
    }

    fn set_bias(&mut self, volts: f32) -> i32 {
        self.log.push(BindingCall::SetBias(volts));
        (volts * 1e3).round() as i32
    }

    fn set_vth(&mut self, value: i32) -> i32 {
        self.log.push(BindingCall::SetVth(value));
        value.clamp(0, 255)
    }

    fn set_timeout(&mut self, value: i32) -> i32 {
        self.log.push(BindingCall::SetTimeout(value));
        value
    }
}
