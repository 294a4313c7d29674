//! Acquisition loop.
//!
//! Pulls frames from a streaming [`Session`] and hands them to a sink.
//! Read failures are handled per [`ReadPolicy`]; cancellation is checked
//! between reads since an in-flight read can only end through the camera's
//! own timeout.

use crate::binding::DeviceBinding;
use crate::error::{Result, TachyonError};
use crate::frame::Frame;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What to do when a read produces no frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReadPolicy {
    /// Count the failure and keep reading.
    #[default]
    Skip,
    /// Return the error.
    Abort,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcquisitionOptions {
    /// Number of reads to attempt. `None` runs until cancelled or the sink
    /// breaks.
    pub frames: Option<u64>,
    pub on_timeout: ReadPolicy,
    pub on_error: ReadPolicy,
    /// Stop once this many reads in a row have failed.
    pub max_consecutive_failures: Option<u32>,
}

impl AcquisitionOptions {
    /// A fixed number of reads, skipping failures.
    pub fn bounded(frames: u64) -> Self {
        Self {
            frames: Some(frames),
            ..Default::default()
        }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }
}

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Completed,
    Cancelled,
    SinkBreak,
    TooManyFailures,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionStats {
    pub reads: u64,
    pub frames: u64,
    pub timeouts: u64,
    pub errors: u64,
    /// Times the firmware counter did not advance by exactly one.
    pub counter_gaps: u64,
    /// Frames missing according to the firmware counter.
    pub dropped_frames: u64,
    pub last_counter: Option<u32>,
    pub stop_reason: StopReason,
}

impl AcquisitionStats {
    fn new() -> Self {
        Self {
            reads: 0,
            frames: 0,
            timeouts: 0,
            errors: 0,
            counter_gaps: 0,
            dropped_frames: 0,
            last_counter: None,
            stop_reason: StopReason::Completed,
        }
    }

    fn record_counter(&mut self, counter: u32) {
        if let Some(prev) = self.last_counter {
            let expected = prev.wrapping_add(1);
            if counter != expected {
                self.counter_gaps += 1;
                if counter > prev {
                    self.dropped_frames += u64::from(counter - expected);
                }
                debug!(previous = prev, counter, "Frame counter gap");
            }
        }
        self.last_counter = Some(counter);
    }
}

/// Read frames until the bound, cancellation, the sink or the failure policy
/// ends the loop.
///
/// Refuses to start while a manual calibration has the shutter closed.
pub fn acquire<B, F>(
    session: &mut Session<B>,
    options: &AcquisitionOptions,
    cancel: &AtomicBool,
    mut sink: F,
) -> Result<AcquisitionStats>
where
    B: DeviceBinding,
    F: FnMut(Frame) -> ControlFlow<()>,
{
    session.require_connected("acquire")?;
    if session.manual_calibration_active() {
        return Err(TachyonError::CalibrationInProgress);
    }

    let mut stats = AcquisitionStats::new();
    let mut consecutive_failures: u32 = 0;
    debug!(frames = ?options.frames, "Acquisition started");

    loop {
        if options.frames.is_some_and(|n| stats.reads >= n) {
            stats.stop_reason = StopReason::Completed;
            break;
        }
        if cancel.load(Ordering::Acquire) {
            stats.stop_reason = StopReason::Cancelled;
            break;
        }

        stats.reads += 1;
        let failure = match session.read_frame() {
            Ok(frame) => {
                consecutive_failures = 0;
                stats.frames += 1;
                stats.record_counter(frame.internal_frame_counter());
                if sink(frame).is_break() {
                    stats.stop_reason = StopReason::SinkBreak;
                    break;
                }
                continue;
            }
            Err(e) => e,
        };

        let policy = match &failure {
            TachyonError::Timeout => {
                stats.timeouts += 1;
                options.on_timeout
            }
            TachyonError::AcquisitionError { code } => {
                debug!(code, read = stats.reads, "Read failed");
                stats.errors += 1;
                options.on_error
            }
            _ => return Err(failure),
        };
        if policy == ReadPolicy::Abort {
            warn!(error = %failure, reads = stats.reads, "Aborting acquisition");
            return Err(failure);
        }

        consecutive_failures += 1;
        if options
            .max_consecutive_failures
            .is_some_and(|limit| consecutive_failures >= limit)
        {
            warn!(consecutive_failures, "Too many consecutive read failures");
            stats.stop_reason = StopReason::TooManyFailures;
            break;
        }
    }

    info!(
        reads = stats.reads,
        frames = stats.frames,
        timeouts = stats.timeouts,
        errors = stats.errors,
        dropped = stats.dropped_frames,
        reason = ?stats.stop_reason,
        "Acquisition finished"
    );
    Ok(stats)
}
