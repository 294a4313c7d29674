//! Camera session state machine.
//!
//! A [`Session`] is one logical connection to one camera. It owns the device
//! binding, enforces the legal call order and performs the settle delays the
//! hardware needs after every shutter or streaming transition.
//!
//! ```text
//! Disconnected --open--> Open --configure--> Configured --connect--> Streaming
//!      ^                  ^                       ^                      |
//!      |                  +-------disconnect------+----------------------+
//!      +------close-------+
//! ```
//!
//! All methods block. A session is not reentrant; share it across threads
//! behind a mutex (see [`crate::driver::TachyonDriver`]).

use crate::binding::{CameraIdentity, DeviceBinding, INFO_BUFFER_LEN};
use crate::calibration::{
    self, CalibrationParams, CalibrationPhase, CalibrationReport, CalibrationSchedule,
    CalibrationStep,
};
use crate::config::{AppliedConfiguration, CameraConfiguration};
use crate::error::{Result, TachyonError};
use crate::frame::{CameraModel, Frame, HEADER_LEN};
use crate::timing::{
    SettleTimer, ThreadSleep, CALIBRATION_SETTLE, CLOSE_SETTLE, FLUSH_SETTLE, SHUTTER_SETTLE,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Upper bound on frames drained by [`Session::flush_buffer`].
///
/// A healthy camera runs dry long before this; hitting it means the binding
/// keeps producing frames after `stop`.
pub const MAX_FLUSH_FRAMES: usize = 10_000;

/// Connection state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Disconnected,
    /// Link open, no configuration applied yet.
    Open,
    Configured,
    Streaming,
}

/// One logical connection to a Tachyon camera.
pub struct Session<B: DeviceBinding> {
    binding: B,
    timer: Arc<dyn SettleTimer>,
    state: SessionState,
    model: CameraModel,
    applied: Option<AppliedConfiguration>,
    calibration: CalibrationPhase,
    schedule: CalibrationSchedule,
}

impl<B: DeviceBinding> std::fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("model", &self.model)
            .field("applied", &self.applied)
            .field("calibration", &self.calibration)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

impl<B: DeviceBinding> Session<B> {
    /// Create a disconnected session that sleeps the calling thread for
    /// settle delays.
    pub fn new(binding: B, model: CameraModel) -> Self {
        Self::with_timer(binding, model, Arc::new(ThreadSleep))
    }

    pub fn with_timer(binding: B, model: CameraModel, timer: Arc<dyn SettleTimer>) -> Self {
        Self {
            binding,
            timer,
            state: SessionState::Disconnected,
            model,
            applied: None,
            calibration: CalibrationPhase::NotStarted,
            schedule: CalibrationSchedule::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state != SessionState::Disconnected
    }

    pub fn model(&self) -> CameraModel {
        self.model
    }

    /// Change the sensor variant. Frame buffers follow the new size on the
    /// next read.
    pub fn set_model(&mut self, model: CameraModel) {
        self.model = model;
    }

    pub fn frame_side(&self) -> usize {
        self.model.frame_side()
    }

    /// Values the camera reported for the last [`Session::configure`].
    pub fn applied_configuration(&self) -> Option<&AppliedConfiguration> {
        self.applied.as_ref()
    }

    pub fn calibration_phase(&self) -> CalibrationPhase {
        self.calibration
    }

    /// Schedule used by [`Session::calibrate`].
    pub fn calibration_schedule(&self) -> &CalibrationSchedule {
        &self.schedule
    }

    /// Replace the schedule used by [`Session::calibrate`].
    pub fn set_calibration_schedule(&mut self, schedule: CalibrationSchedule) -> Result<()> {
        schedule.validate()?;
        self.schedule = schedule;
        Ok(())
    }

    /// True between [`Session::start_calibration`] and
    /// [`Session::stop_calibration`].
    pub fn manual_calibration_active(&self) -> bool {
        self.calibration.shutter_blocked()
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    pub fn binding_mut(&mut self) -> &mut B {
        &mut self.binding
    }

    pub fn into_binding(self) -> B {
        self.binding
    }

    pub(crate) fn require_connected(&self, operation: &'static str) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(TachyonError::NotConnected { operation })
        }
    }

    /// State to fall back to once streaming stops.
    fn idle_state(&self) -> SessionState {
        if self.applied.is_some() {
            SessionState::Configured
        } else {
            SessionState::Open
        }
    }

    // ---- link management -------------------------------------------------

    /// Open the USB link. A no-op if already open.
    pub fn open(&mut self) -> Result<()> {
        if self.is_connected() {
            debug!("Camera already open");
            return Ok(());
        }

        let count = self.binding.open_camera();
        if count <= 0 {
            let usb_error = self.binding.usb_error();
            warn!(count, usb_error = ?usb_error, "Failed to open camera");
            return Err(TachyonError::OpenFailed { count });
        }

        self.state = SessionState::Open;
        info!(cameras = count, model = %self.model, "Camera opened");
        Ok(())
    }

    /// Close the USB link. A no-op if already closed.
    ///
    /// On failure the session stays connected so the caller can retry.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_connected() {
            debug!("Camera already closed");
            return Ok(());
        }

        let code = self.binding.close_camera();
        if code <= 0 {
            warn!(code, "Failed to close camera");
            return Err(TachyonError::CloseFailed { code });
        }

        self.timer.settle(CLOSE_SETTLE);
        self.state = SessionState::Disconnected;
        self.applied = None;
        self.calibration = CalibrationPhase::NotStarted;
        info!("Camera closed");
        Ok(())
    }

    /// Reset the camera electronics. Any applied configuration is forgotten.
    pub fn reset(&mut self) -> Result<()> {
        self.require_connected("reset")?;

        let code = self.binding.reset_camera();
        if code < 0 {
            return Err(TachyonError::ResetFailed { code });
        }

        self.state = SessionState::Open;
        self.applied = None;
        self.calibration = CalibrationPhase::NotStarted;
        info!("Camera reset");
        Ok(())
    }

    /// Address a different camera when several are attached.
    pub fn select_camera(&mut self, index: i32) -> Result<()> {
        self.require_connected("select camera")?;

        let code = self.binding.set_active_camera(index);
        if code < 0 {
            return Err(TachyonError::SelectFailed { index, code });
        }
        info!(index, "Active camera selected");
        Ok(())
    }

    /// Last USB error string from the library, if it has one.
    pub fn last_usb_error(&mut self) -> Option<String> {
        self.binding.usb_error()
    }

    /// Read description, serial number and manufacturer.
    pub fn identity(&mut self) -> Result<CameraIdentity> {
        self.require_connected("get identity")?;

        let mut description = [0u8; INFO_BUFFER_LEN];
        let mut serial_number = [0u8; INFO_BUFFER_LEN];
        let mut manufacturer = [0u8; INFO_BUFFER_LEN];
        let code = self
            .binding
            .camera_info(&mut description, &mut serial_number, &mut manufacturer);

        let identity = CameraIdentity::from_buffers(&description, &serial_number, &manufacturer);
        debug!(
            code,
            description = %identity.description,
            serial = %identity.serial_number,
            "Camera identity"
        );
        Ok(identity)
    }

    // ---- configuration ---------------------------------------------------

    /// Push exposure and bias settings.
    ///
    /// Stores what the camera reports back, which may be clamped.
    pub fn configure(&mut self, values: &CameraConfiguration) -> Result<AppliedConfiguration> {
        self.require_connected("configure")?;

        let applied = AppliedConfiguration {
            integration_time: self.binding.set_integration_time(values.int_time),
            wait_time: self.binding.set_wait_time(values.wait_time),
            bias: self.binding.set_bias(values.bias),
            vth_value: self.binding.set_vth(values.vth_value),
            timeout: self.binding.set_timeout(values.timeout),
        };

        self.applied = Some(applied);
        if self.state == SessionState::Open {
            self.state = SessionState::Configured;
        }
        info!(
            int_time = values.int_time,
            wait_time = values.wait_time,
            bias = values.bias,
            vth = values.vth_value,
            timeout = values.timeout,
            "Camera configured"
        );
        debug!(?applied, "Camera reported applied values");
        Ok(applied)
    }

    // ---- streaming -------------------------------------------------------

    /// Flush stale frames, start the stream and open the shutter.
    pub fn connect(&mut self) -> Result<()> {
        self.require_connected("connect")?;

        self.flush_buffer()?;

        let code = self.binding.start();
        if code != 0 {
            warn!(code, "Device start failed; shutter left closed");
            return Err(TachyonError::StreamStartFailed { code });
        }

        if let Err(e) = self.shutter_open() {
            let code = self.binding.stop();
            warn!(error = %e, stop_code = code, "Shutter did not open; stream stopped");
            return Err(e);
        }
        self.timer.settle(SHUTTER_SETTLE);
        self.state = SessionState::Streaming;
        info!("Streaming started");
        Ok(())
    }

    /// Stop the stream and close the shutter.
    pub fn disconnect(&mut self) -> Result<()> {
        self.require_connected("disconnect")?;

        let code = self.binding.stop();
        if code < 0 {
            return Err(TachyonError::StreamStopFailed { code });
        }

        self.shutter_close()?;
        self.timer.settle(SHUTTER_SETTLE);
        self.state = self.idle_state();
        info!("Streaming stopped");
        Ok(())
    }

    /// Stop streaming and drain every frame still buffered.
    ///
    /// Returns the number of frames discarded. A failing stop is logged and
    /// draining continues.
    pub fn flush_buffer(&mut self) -> Result<usize> {
        self.require_connected("flush buffer")?;

        if let Err(e) = self.disconnect() {
            warn!(error = %e, "Stop before flush failed");
        }

        let mut drained = 0;
        loop {
            if drained >= MAX_FLUSH_FRAMES {
                warn!(drained, "Flush limit reached; camera still delivering frames");
                break;
            }
            match self.read_frame() {
                Ok(_) => drained += 1,
                Err(e) if e.is_read_failure() => break,
                Err(e) => return Err(e),
            }
        }

        self.timer.settle(FLUSH_SETTLE);
        debug!(drained, "Frame buffer flushed");
        Ok(drained)
    }

    /// Read one frame into freshly allocated buffers.
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.require_connected("read frame")?;

        let mut header = [0u8; HEADER_LEN];
        let mut pixels = vec![0i16; self.model.pixel_count()];
        let code = self.binding.read_frame(&mut header, &mut pixels);
        if code < 0 {
            let err = TachyonError::from_read_code(code);
            if err.is_timeout() {
                debug!("Timed out waiting for images");
            }
            return Err(err);
        }

        Frame::decode(self.model, header, pixels).ok_or(TachyonError::AcquisitionError { code })
    }

    // ---- calibration -----------------------------------------------------

    /// Scripted offset calibration with the session's schedule.
    pub fn calibrate(&mut self, params: CalibrationParams) -> Result<CalibrationReport> {
        let schedule = self.schedule;
        self.calibrate_with(&schedule, params)
    }

    pub fn calibrate_with(
        &mut self,
        schedule: &CalibrationSchedule,
        params: CalibrationParams,
    ) -> Result<CalibrationReport> {
        let report = calibration::run_scripted(self, schedule, params)?;
        self.calibration = report.phase;
        Ok(report)
    }

    /// Close the shutter and begin a caller-timed calibration.
    ///
    /// If the camera rejects either call the shutter is reopened before the
    /// error is returned.
    pub fn start_calibration(&mut self, params: CalibrationParams) -> Result<()> {
        self.require_connected("start calibration")?;

        self.manual_step(CalibrationStep::CloseShutter)?;
        self.timer.settle(SHUTTER_SETTLE);
        self.manual_step(CalibrationStep::StartCalibration(params))?;
        self.timer.settle(CALIBRATION_SETTLE);
        info!(calibration_target = params.target, "Manual calibration started");
        Ok(())
    }

    /// End a caller-timed calibration and reopen the shutter.
    pub fn stop_calibration(&mut self) -> Result<()> {
        self.require_connected("stop calibration")?;

        self.manual_step(CalibrationStep::StopCalibration)?;
        self.timer.settle(CALIBRATION_SETTLE);
        self.manual_step(CalibrationStep::OpenShutter)?;
        self.timer.settle(SHUTTER_SETTLE);
        self.calibration = CalibrationPhase::Complete;
        info!("Manual calibration stopped");
        Ok(())
    }

    fn manual_step(&mut self, step: CalibrationStep) -> Result<()> {
        self.apply_calibration_step(step).inspect_err(|e| {
            warn!(?step, error = %e, "Manual calibration step failed");
            self.abandon_calibration();
        })
    }

    /// Issue one calibration hardware call and advance the phase.
    pub(crate) fn apply_calibration_step(&mut self, step: CalibrationStep) -> Result<()> {
        match step {
            CalibrationStep::CloseShutter => self.shutter_close()?,
            CalibrationStep::StartCalibration(params) => {
                let code = self
                    .binding
                    .calibrate(params.target, params.auto_off_flag());
                if code < 0 {
                    return Err(TachyonError::CalibrationFailed {
                        action: "start",
                        code,
                    });
                }
            }
            CalibrationStep::StopCalibration => {
                let code = self.binding.stop_calibration();
                if code < 0 {
                    return Err(TachyonError::CalibrationFailed {
                        action: "stop",
                        code,
                    });
                }
            }
            CalibrationStep::OpenShutter => self.shutter_open()?,
        }
        self.calibration = step.phase_after();
        Ok(())
    }

    /// Best-effort return to live imaging after a calibration call failed.
    ///
    /// Stops an active calibration and reopens a closed shutter. The phase
    /// becomes [`CalibrationPhase::Aborted`] unless the shutter stays closed.
    pub(crate) fn abandon_calibration(&mut self) {
        if self.calibration == CalibrationPhase::Calibrating {
            let code = self.binding.stop_calibration();
            if code < 0 {
                warn!(code, "Stop calibration failed during recovery");
            }
        }
        if self.calibration.shutter_blocked() {
            if let Err(e) = self.shutter_open() {
                warn!(error = %e, "Shutter still closed after failed calibration");
                return;
            }
            self.timer.settle(SHUTTER_SETTLE);
        }
        self.calibration = CalibrationPhase::Aborted;
        info!("Calibration abandoned; shutter open");
    }

    fn shutter_open(&mut self) -> Result<()> {
        let code = self.binding.open_shutter();
        if code < 0 {
            return Err(TachyonError::ShutterFailed {
                action: "open",
                code,
            });
        }
        Ok(())
    }

    fn shutter_close(&mut self) -> Result<()> {
        let code = self.binding.close_shutter();
        if code < 0 {
            return Err(TachyonError::ShutterFailed {
                action: "close",
                code,
            });
        }
        Ok(())
    }
}
