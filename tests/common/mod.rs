//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use tachyon_daq::config::CameraConfiguration;
use tachyon_daq::mock::{CallLog, MockBinding};
use tachyon_daq::timing::RecordingTimer;
use tachyon_daq::{CameraModel, Session};

/// Session over a mock camera, with handles to its call log and timer.
pub struct Harness {
    pub session: Session<MockBinding>,
    pub log: CallLog,
    pub timer: RecordingTimer,
}

pub fn harness(mock: MockBinding) -> Harness {
    let log = mock.call_log();
    let timer = RecordingTimer::new();
    let model = mock.model();
    let session = Session::with_timer(mock, model, Arc::new(timer.clone()));
    Harness {
        session,
        log,
        timer,
    }
}

pub fn mock_1024() -> MockBinding {
    MockBinding::new(CameraModel::Tachyon1024)
}

/// Opened session with log and timer cleared.
pub fn open_harness(mock: MockBinding) -> Harness {
    let mut h = harness(mock);
    h.session.open().unwrap();
    h.log.clear();
    h.timer.clear();
    h
}

/// Opened and streaming session with log and timer cleared.
pub fn streaming_harness(mock: MockBinding) -> Harness {
    let mut h = harness(mock);
    h.session.open().unwrap();
    h.session.connect().unwrap();
    h.log.clear();
    h.timer.clear();
    h
}

pub fn sample_configuration() -> CameraConfiguration {
    CameraConfiguration {
        int_time: 0.0001,
        wait_time: 0.0002,
        bias: 2.0,
        vth_value: 127,
        timeout: 5,
    }
}

pub fn sample_config() -> tachyon_daq::TachyonConfig {
    tachyon_daq::TachyonConfig {
        configuration: sample_configuration(),
        camera: Default::default(),
        firmware: Default::default(),
        logging: Default::default(),
    }
}
