//! Startup sequence: identity-driven model selection and firmware upload.

mod common;

use common::{mock_1024, sample_config};
use std::sync::Arc;
use tachyon_daq::bootstrap::bootstrap;
use tachyon_daq::calibration::{CalibrationParams, CalibrationSchedule};
use tachyon_daq::firmware::{FirmwareLoader, RecordingFirmwareLoader};
use tachyon_daq::mock::{BindingCall, MockBinding};
use tachyon_daq::timing::RecordingTimer;
use tachyon_daq::{CameraModel, SessionState, TachyonError};

struct FailingLoader;

impl FirmwareLoader for FailingLoader {
    fn load(&self) -> tachyon_daq::Result<()> {
        Err(TachyonError::Firmware {
            message: "java not installed".to_string(),
        })
    }
}

fn timer() -> Arc<RecordingTimer> {
    Arc::new(RecordingTimer::new())
}

#[test]
fn tachyon_1024_gets_firmware_once() {
    let mock = mock_1024();
    let log = mock.call_log();
    let loader = RecordingFirmwareLoader::new();

    let booted = bootstrap(mock, &sample_config(), &loader, timer()).unwrap();

    assert_eq!(loader.calls(), 1);
    assert_eq!(booted.session.model(), CameraModel::Tachyon1024);
    assert_eq!(booted.session.frame_side(), 32);
    assert_eq!(booted.session.state(), SessionState::Configured);
    assert_eq!(booted.identity.description, CameraModel::DESCRIPTION_1024);
    assert_eq!(booted.applied.vth_value, 127);
    assert_eq!(
        log.calls(),
        vec![
            BindingCall::OpenCamera,
            BindingCall::CameraInfo,
            BindingCall::SetIntegrationTime(0.0001),
            BindingCall::SetWaitTime(0.0002),
            BindingCall::SetBias(2.0),
            BindingCall::SetVth(127),
            BindingCall::SetTimeout(5),
        ]
    );
}

#[test]
fn tachyon_6400_skips_firmware() {
    let loader = RecordingFirmwareLoader::new();
    // Configured default disagrees with the camera; identity wins
    let mut config = sample_config();
    config.camera.default_model = CameraModel::Tachyon1024;

    let booted = bootstrap(
        MockBinding::new(CameraModel::Tachyon6400),
        &config,
        &loader,
        timer(),
    )
    .unwrap();

    assert_eq!(loader.calls(), 0);
    assert_eq!(booted.session.model(), CameraModel::Tachyon6400);
    assert_eq!(booted.session.frame_side(), 80);
}

#[test]
fn unknown_identity_falls_back_to_configured_model() {
    let loader = RecordingFirmwareLoader::new();
    let mut config = sample_config();
    config.camera.default_model = CameraModel::Tachyon6400;

    let booted = bootstrap(
        mock_1024().with_description("TACHYON PROTOTYPE"),
        &config,
        &loader,
        timer(),
    )
    .unwrap();

    assert_eq!(loader.calls(), 0);
    assert_eq!(booted.session.model(), CameraModel::Tachyon6400);
}

#[test]
fn firmware_can_be_disabled() {
    let loader = RecordingFirmwareLoader::new();
    let mut config = sample_config();
    config.firmware.enabled = false;

    bootstrap(mock_1024(), &config, &loader, timer()).unwrap();

    assert_eq!(loader.calls(), 0);
}

#[test]
fn loader_failure_does_not_stop_startup() {
    let booted = bootstrap(mock_1024(), &sample_config(), &FailingLoader, timer()).unwrap();
    assert_eq!(booted.session.state(), SessionState::Configured);
}

#[test]
fn active_camera_is_selected_after_open() {
    let mock = mock_1024().with_camera_count(2);
    let log = mock.call_log();
    let mut config = sample_config();
    config.camera.active_camera = Some(1);

    bootstrap(mock, &config, &RecordingFirmwareLoader::new(), timer()).unwrap();

    let calls = log.calls();
    assert_eq!(calls[0], BindingCall::OpenCamera);
    assert_eq!(calls[1], BindingCall::SetActiveCamera(1));
    assert_eq!(calls[2], BindingCall::CameraInfo);
}

#[test]
fn open_failure_aborts_before_identity() {
    let mock = mock_1024().with_camera_count(0);
    let log = mock.call_log();
    let loader = RecordingFirmwareLoader::new();

    let err = bootstrap(mock, &sample_config(), &loader, timer()).unwrap_err();

    assert!(matches!(err, TachyonError::OpenFailed { count: 0 }));
    assert_eq!(log.count(&BindingCall::CameraInfo), 0);
    assert_eq!(loader.calls(), 0);
}

#[test]
fn configured_calibration_schedule_drives_calibrate() {
    let mock = mock_1024();
    let log = mock.call_log();
    let mut config = sample_config();
    let schedule = CalibrationSchedule {
        iterations: 10,
        close_shutter_at: 1,
        start_calibration_at: 2,
        stop_calibration_at: 6,
        open_shutter_at: 8,
    };
    config.camera.calibration = schedule;

    let mut session = bootstrap(mock, &config, &RecordingFirmwareLoader::new(), timer())
        .unwrap()
        .session;
    assert_eq!(session.calibration_schedule(), &schedule);

    session.connect().unwrap();
    log.clear();
    let report = session.calibrate(CalibrationParams::default()).unwrap();

    assert_eq!(report.iterations, 10);
    assert_eq!(log.reads(), 10);
    assert_eq!(log.reads_before(&BindingCall::StopCalibration), Some(6));
}

#[test]
fn invalid_configured_schedule_fails_before_open() {
    let mock = mock_1024();
    let log = mock.call_log();
    let mut config = sample_config();
    config.camera.calibration.iterations = 100;

    let err = bootstrap(mock, &config, &RecordingFirmwareLoader::new(), timer()).unwrap_err();

    assert!(matches!(err, TachyonError::InvalidSchedule { .. }));
    assert!(log.calls().is_empty());
}
