//! Dark-current offset calibration.
//!
//! Two shapes are offered:
//!
//! - **Scripted** ([`Session::calibrate`]): a fixed-length read loop that
//!   drives the shutter and calibration calls at fixed iteration indices. The
//!   camera frame rate is the clock: 3000 reads at the configured integration
//!   and wait times set how long the shutter stays closed.
//! - **Manual** ([`Session::start_calibration`] /
//!   [`Session::stop_calibration`]): the caller decides how long to dwell
//!   between the two halves.
//!
//! ```text
//! iteration:  0 ... 100 ........ 600 ............ 2600 ..... 2700 ..... 3000
//!                   close        calibrate        stop       open
//!                   shutter      (target,auto)    calib.     shutter
//! ```
//!
//! [`Session::calibrate`]: crate::session::Session::calibrate
//! [`Session::start_calibration`]: crate::session::Session::start_calibration
//! [`Session::stop_calibration`]: crate::session::Session::stop_calibration

use crate::binding::DeviceBinding;
use crate::error::{Result, TachyonError};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Offset calibration target used when the caller does not pick one.
pub const DEFAULT_TARGET: i32 = 100;

/// Arguments forwarded to the library's `calibrate(target, auto_off)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationParams {
    pub target: i32,
    pub auto_off: bool,
}

impl CalibrationParams {
    pub fn new(target: i32) -> Self {
        Self {
            target,
            ..Default::default()
        }
    }

    pub(crate) fn auto_off_flag(&self) -> i32 {
        i32::from(self.auto_off)
    }
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            target: DEFAULT_TARGET,
            auto_off: true,
        }
    }
}

/// Where a calibration run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CalibrationPhase {
    NotStarted,
    ShutterClosed,
    Calibrating,
    Stopping,
    ShutterOpen,
    Complete,
    /// A calibration call failed and the shutter was reopened.
    Aborted,
}

impl CalibrationPhase {
    /// True while the sensor is blocked and live frames would be dark.
    pub fn shutter_blocked(self) -> bool {
        matches!(self, Self::ShutterClosed | Self::Calibrating | Self::Stopping)
    }
}

/// Hardware action triggered at a scheduled iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationStep {
    CloseShutter,
    StartCalibration(CalibrationParams),
    StopCalibration,
    OpenShutter,
}

impl CalibrationStep {
    /// Phase the run enters once this step succeeded.
    pub fn phase_after(self) -> CalibrationPhase {
        match self {
            Self::CloseShutter => CalibrationPhase::ShutterClosed,
            Self::StartCalibration(_) => CalibrationPhase::Calibrating,
            Self::StopCalibration => CalibrationPhase::Stopping,
            Self::OpenShutter => CalibrationPhase::ShutterOpen,
        }
    }
}

/// Iteration indices of the scripted calibration.
///
/// The defaults are tied to the calibration physics of the camera; do not
/// change them without re-validating the offset maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationSchedule {
    /// Total number of frame reads.
    pub iterations: u32,
    pub close_shutter_at: u32,
    pub start_calibration_at: u32,
    pub stop_calibration_at: u32,
    pub open_shutter_at: u32,
}

impl Default for CalibrationSchedule {
    fn default() -> Self {
        Self {
            iterations: 3000,
            close_shutter_at: 100,
            start_calibration_at: 600,
            stop_calibration_at: 2600,
            open_shutter_at: 2700,
        }
    }
}

impl CalibrationSchedule {
    /// Trigger points must be strictly increasing and inside the loop.
    pub fn validate(&self) -> Result<()> {
        let points = [
            ("close_shutter_at", self.close_shutter_at),
            ("start_calibration_at", self.start_calibration_at),
            ("stop_calibration_at", self.stop_calibration_at),
            ("open_shutter_at", self.open_shutter_at),
        ];
        for pair in points.windows(2) {
            let (prev_name, prev) = pair[0];
            let (name, at) = pair[1];
            if at <= prev {
                return Err(TachyonError::InvalidSchedule {
                    message: format!("{name} ({at}) must come after {prev_name} ({prev})"),
                });
            }
        }
        if self.open_shutter_at >= self.iterations {
            return Err(TachyonError::InvalidSchedule {
                message: format!(
                    "open_shutter_at ({}) must be below iterations ({})",
                    self.open_shutter_at, self.iterations
                ),
            });
        }
        Ok(())
    }

    /// Step scheduled for iteration `k`, if any.
    pub fn step_at(&self, k: u32, params: CalibrationParams) -> Option<CalibrationStep> {
        if k == self.close_shutter_at {
            Some(CalibrationStep::CloseShutter)
        } else if k == self.start_calibration_at {
            Some(CalibrationStep::StartCalibration(params))
        } else if k == self.stop_calibration_at {
            Some(CalibrationStep::StopCalibration)
        } else if k == self.open_shutter_at {
            Some(CalibrationStep::OpenShutter)
        } else {
            None
        }
    }
}

/// Outcome of a scripted calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub iterations: u32,
    /// Reads that returned a frame (frames are discarded).
    pub frames: u32,
    pub timeouts: u32,
    pub errors: u32,
    pub phase: CalibrationPhase,
}

/// Run the scripted loop against an open session.
///
/// Each iteration first applies the step scheduled for it, then performs one
/// read. Read failures are counted, never fatal. A failing hardware step
/// ends the run early: calibration is stopped and the shutter reopened before
/// the error is returned.
pub(crate) fn run_scripted<B: DeviceBinding>(
    session: &mut Session<B>,
    schedule: &CalibrationSchedule,
    params: CalibrationParams,
) -> Result<CalibrationReport> {
    session.require_connected("calibrate")?;
    schedule.validate()?;

    info!(
        calibration_target = params.target,
        auto_off = params.auto_off,
        iterations = schedule.iterations,
        "Starting scripted offset calibration"
    );

    let mut report = CalibrationReport {
        iterations: schedule.iterations,
        frames: 0,
        timeouts: 0,
        errors: 0,
        phase: CalibrationPhase::NotStarted,
    };

    for k in 0..schedule.iterations {
        if let Some(step) = schedule.step_at(k, params) {
            debug!(iteration = k, ?step, "Calibration step");
            if let Err(e) = session.apply_calibration_step(step) {
                warn!(iteration = k, error = %e, "Calibration step failed");
                session.abandon_calibration();
                return Err(e);
            }
            report.phase = step.phase_after();
        }

        match session.read_frame() {
            Ok(_) => report.frames += 1,
            Err(TachyonError::Timeout) => report.timeouts += 1,
            Err(TachyonError::AcquisitionError { code }) => {
                debug!(iteration = k, code, "Calibration read failed");
                report.errors += 1;
            }
            Err(e) => return Err(e),
        }
    }

    report.phase = CalibrationPhase::Complete;
    if report.timeouts > 0 || report.errors > 0 {
        warn!(
            timeouts = report.timeouts,
            errors = report.errors,
            "Calibration finished with missed frames"
        );
    }
    info!(frames = report.frames, "Offset calibration complete");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_matches_camera_protocol() {
        let s = CalibrationSchedule::default();
        let p = CalibrationParams::new(24);
        assert_eq!(s.iterations, 3000);
        assert_eq!(s.step_at(100, p), Some(CalibrationStep::CloseShutter));
        assert_eq!(s.step_at(600, p), Some(CalibrationStep::StartCalibration(p)));
        assert_eq!(s.step_at(2600, p), Some(CalibrationStep::StopCalibration));
        assert_eq!(s.step_at(2700, p), Some(CalibrationStep::OpenShutter));
        assert_eq!(s.step_at(0, p), None);
        assert_eq!(s.step_at(2999, p), None);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn schedule_validation_rejects_disorder() {
        let s = CalibrationSchedule {
            start_calibration_at: 50,
            ..Default::default()
        };
        assert!(matches!(
            s.validate(),
            Err(TachyonError::InvalidSchedule { .. })
        ));

        let s = CalibrationSchedule {
            iterations: 2700,
            ..Default::default()
        };
        assert!(s.validate().is_err());
    }

    #[test]
    fn params_default_and_flag() {
        let p = CalibrationParams::default();
        assert_eq!(p.target, 100);
        assert_eq!(p.auto_off_flag(), 1);
        let p = CalibrationParams {
            target: 24,
            auto_off: false,
        };
        assert_eq!(p.auto_off_flag(), 0);
        assert_eq!(CalibrationParams::new(24).target, 24);
    }

    #[test]
    fn blocked_phases() {
        assert!(CalibrationPhase::Calibrating.shutter_blocked());
        assert!(!CalibrationPhase::ShutterOpen.shutter_blocked());
        assert!(!CalibrationPhase::Complete.shutter_blocked());
        assert!(!CalibrationPhase::Aborted.shutter_blocked());
    }
}
