//! Settle delays between hardware state changes.
//!
//! The shutter is mechanical and the focal plane needs thermal stabilization,
//! so every shutter or streaming transition is followed by a fixed blocking
//! wait. The durations below are part of the camera protocol.
//!
//! Delays go through [`SettleTimer`] so tests can record them instead of
//! stalling the thread.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Wait after closing the USB link.
pub const CLOSE_SETTLE: Duration = Duration::from_millis(100);
/// Wait after opening or closing the shutter when starting/stopping a stream.
pub const SHUTTER_SETTLE: Duration = Duration::from_millis(500);
/// Wait after issuing calibrate or stop-calibration.
pub const CALIBRATION_SETTLE: Duration = Duration::from_millis(100);
/// Wait after the buffer flush loop drains.
pub const FLUSH_SETTLE: Duration = Duration::from_millis(500);

/// Blocking wait used for settle delays.
pub trait SettleTimer: Send + Sync {
    fn settle(&self, duration: Duration);
}

/// Production timer: stalls the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl SettleTimer for ThreadSleep {
    fn settle(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Records requested delays without sleeping.
///
/// Clones share the same log.
#[derive(Debug, Default, Clone)]
pub struct RecordingTimer {
    log: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.log.lock().clone()
    }

    pub fn total(&self) -> Duration {
        self.log.lock().iter().sum()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }
}

impl SettleTimer for RecordingTimer {
    fn settle(&self, duration: Duration) {
        self.log.lock().push(duration);
    }
}
