//! Session state machine against the simulated camera.

mod common;

use common::{harness, mock_1024, open_harness, sample_configuration, streaming_harness};
use tachyon_daq::calibration::{CalibrationParams, CalibrationPhase};
use tachyon_daq::mock::{BindingCall, MockBinding, MOCK_HEADER_ID};
use tachyon_daq::session::MAX_FLUSH_FRAMES;
use tachyon_daq::timing::{CALIBRATION_SETTLE, CLOSE_SETTLE, FLUSH_SETTLE, SHUTTER_SETTLE};
use tachyon_daq::{CameraModel, SessionState, TachyonError};

#[test]
fn open_twice_calls_binding_once() {
    let mut h = harness(mock_1024());

    h.session.open().unwrap();
    h.session.open().unwrap();

    assert!(h.session.is_connected());
    assert_eq!(h.session.state(), SessionState::Open);
    assert_eq!(h.log.count(&BindingCall::OpenCamera), 1);
}

#[test]
fn open_failure_leaves_session_disconnected() {
    let mut h = harness(
        mock_1024()
            .with_camera_count(0)
            .with_usb_error("LIBUSB_ERROR_NO_DEVICE"),
    );

    let err = h.session.open().unwrap_err();
    assert!(matches!(err, TachyonError::OpenFailed { count: 0 }));
    assert!(!h.session.is_connected());
    assert_eq!(
        h.log.calls(),
        vec![BindingCall::OpenCamera, BindingCall::UsbError]
    );

    // Recoverable: a later attempt goes back to the binding
    h.session.open().unwrap_err();
    assert_eq!(h.log.count(&BindingCall::OpenCamera), 2);
}

#[test]
fn configure_while_disconnected_never_reaches_binding() {
    let mut h = harness(mock_1024());

    let err = h.session.configure(&sample_configuration()).unwrap_err();
    assert!(matches!(
        err,
        TachyonError::NotConnected {
            operation: "configure"
        }
    ));
    assert!(h.log.calls().is_empty());
    assert!(h.session.applied_configuration().is_none());
}

#[test]
fn configure_stores_reported_values_in_order() {
    let mut h = open_harness(mock_1024());
    let mut values = sample_configuration();
    values.vth_value = 400;

    let applied = h.session.configure(&values).unwrap();

    assert_eq!(
        h.log.calls(),
        vec![
            BindingCall::SetIntegrationTime(0.0001),
            BindingCall::SetWaitTime(0.0002),
            BindingCall::SetBias(2.0),
            BindingCall::SetVth(400),
            BindingCall::SetTimeout(5),
        ]
    );
    assert_eq!(applied.integration_time, 100);
    assert_eq!(applied.wait_time, 200);
    assert_eq!(applied.bias, 2000);
    // Camera clamped the request; the session keeps what it reported
    assert_eq!(applied.vth_value, 255);
    assert_eq!(applied.timeout, 5);
    assert_eq!(h.session.applied_configuration(), Some(&applied));
    assert_eq!(h.session.state(), SessionState::Configured);
}

#[test]
fn close_settles_then_disconnects() {
    let mut h = open_harness(mock_1024());

    h.session.close().unwrap();
    assert!(!h.session.is_connected());
    assert_eq!(h.timer.delays(), vec![CLOSE_SETTLE]);

    h.session.close().unwrap();
    assert_eq!(h.log.count(&BindingCall::CloseCamera), 1);
}

#[test]
fn close_failure_keeps_session_connected() {
    let mut h = open_harness(mock_1024().with_close_code(0));

    let err = h.session.close().unwrap_err();
    assert!(matches!(err, TachyonError::CloseFailed { code: 0 }));
    assert!(h.session.is_connected());
    assert!(h.timer.delays().is_empty());
}

#[test]
fn identity_reads_three_buffers() {
    let mut h = harness(mock_1024());
    assert!(h.session.identity().unwrap_err().is_not_connected());

    h.session.open().unwrap();
    h.log.clear();
    let identity = h.session.identity().unwrap();

    assert_eq!(identity.description, CameraModel::DESCRIPTION_1024);
    assert_eq!(identity.serial_number, "MOCK-0001");
    assert_eq!(identity.manufacturer, "NEW INFRARED TECHNOLOGIES");
    assert_eq!(h.log.calls(), vec![BindingCall::CameraInfo]);
}

#[test]
fn connect_flushes_then_starts_and_opens_shutter() {
    let mut h = open_harness(mock_1024());

    h.session.connect().unwrap();

    assert_eq!(
        h.log.control_calls(),
        vec![
            BindingCall::Stop,
            BindingCall::CloseShutter,
            BindingCall::Start,
            BindingCall::OpenShutter,
        ]
    );
    // Two stale frames drained, third read timed out
    assert_eq!(h.log.reads(), 3);
    assert_eq!(
        h.log.reads_before(&BindingCall::Start),
        Some(3),
        "flush must finish before start"
    );
    assert_eq!(
        h.timer.delays(),
        vec![SHUTTER_SETTLE, FLUSH_SETTLE, SHUTTER_SETTLE]
    );
    assert_eq!(h.session.state(), SessionState::Streaming);
    assert!(h.session.binding().is_shutter_open());
}

#[test]
fn connect_with_failing_start_never_opens_shutter() {
    let mut h = open_harness(mock_1024().with_start_code(-3));

    let err = h.session.connect().unwrap_err();

    assert!(matches!(err, TachyonError::StreamStartFailed { code: -3 }));
    assert_eq!(h.log.count(&BindingCall::OpenShutter), 0);
    assert_ne!(h.session.state(), SessionState::Streaming);
}

#[test]
fn connect_stops_device_when_shutter_fails_to_open() {
    let mut h = open_harness(mock_1024().with_open_shutter_code(-3));

    let err = h.session.connect().unwrap_err();

    assert!(matches!(
        err,
        TachyonError::ShutterFailed {
            action: "open",
            code: -3
        }
    ));
    assert_eq!(
        h.log.control_calls(),
        vec![
            BindingCall::Stop,
            BindingCall::CloseShutter,
            BindingCall::Start,
            BindingCall::OpenShutter,
            BindingCall::Stop,
        ]
    );
    assert!(!h.session.binding().is_streaming());
    assert_eq!(h.session.state(), SessionState::Open);
}

#[test]
fn disconnect_stops_then_closes_shutter() {
    let mut h = streaming_harness(mock_1024());
    h.session.configure(&sample_configuration()).unwrap();
    h.log.clear();

    h.session.disconnect().unwrap();

    assert_eq!(
        h.log.calls(),
        vec![BindingCall::Stop, BindingCall::CloseShutter]
    );
    assert_eq!(h.timer.delays(), vec![SHUTTER_SETTLE]);
    assert_eq!(h.session.state(), SessionState::Configured);
}

#[test]
fn disconnect_failure_is_reported_without_shutter() {
    let mut h = streaming_harness(mock_1024().with_stop_code(-1));

    let err = h.session.disconnect().unwrap_err();

    assert!(matches!(err, TachyonError::StreamStopFailed { code: -1 }));
    assert_eq!(h.log.calls(), vec![BindingCall::Stop]);
    assert!(h.timer.delays().is_empty());
}

#[test]
fn streaming_calls_fail_fast_when_disconnected() {
    let mut h = harness(mock_1024());

    assert!(h.session.connect().unwrap_err().is_not_connected());
    assert!(h.session.disconnect().unwrap_err().is_not_connected());
    assert!(h.session.flush_buffer().unwrap_err().is_not_connected());
    assert!(h.session.read_frame().unwrap_err().is_not_connected());
    assert!(h.log.calls().is_empty());
}

#[test]
fn flush_drains_residual_frames_and_settles() {
    let mut h = streaming_harness(mock_1024().with_residual_frames(3));

    let drained = h.session.flush_buffer().unwrap();

    assert_eq!(drained, 3);
    assert_eq!(h.log.reads(), 4);
    assert_eq!(h.timer.delays(), vec![SHUTTER_SETTLE, FLUSH_SETTLE]);
}

#[test]
fn flush_settles_even_when_buffer_is_empty() {
    let mut h = open_harness(mock_1024().with_stale_frames(0));

    assert_eq!(h.session.flush_buffer().unwrap(), 0);
    assert_eq!(h.timer.delays().last(), Some(&FLUSH_SETTLE));
}

#[test]
fn flush_is_bounded_when_camera_never_drains() {
    // A stop that fails leaves the camera streaming forever
    let mut h = streaming_harness(mock_1024().with_stop_code(-1));

    let drained = h.session.flush_buffer().unwrap();

    assert_eq!(drained, MAX_FLUSH_FRAMES);
    assert_eq!(h.timer.delays(), vec![FLUSH_SETTLE]);
}

#[test]
fn read_frame_returns_square_grid_and_raw_header() {
    let mut h = streaming_harness(mock_1024());

    let frame = h.session.read_frame().unwrap();

    assert_eq!(frame.pixels.dim(), (32, 32));
    assert_eq!(frame.pixels.len(), h.session.frame_side().pow(2));
    assert_eq!(frame.raw_header.len(), 64);
    assert_eq!(frame.header.header_id, MOCK_HEADER_ID);
}

#[test]
fn read_frame_6400_model() {
    let mut h = streaming_harness(MockBinding::new(CameraModel::Tachyon6400));

    let frame = h.session.read_frame().unwrap();
    assert_eq!(frame.side(), 80);
    assert_eq!(frame.pixels.len(), 6400);
}

#[test]
fn read_failures_are_classified() {
    let mut h = streaming_harness(mock_1024());
    h.session.binding_mut().push_read_code(-116);
    h.session.binding_mut().push_read_code(-5);

    assert!(matches!(h.session.read_frame(), Err(TachyonError::Timeout)));
    assert!(matches!(
        h.session.read_frame(),
        Err(TachyonError::AcquisitionError { code: -5 })
    ));
    assert!(h.session.read_frame().is_ok());
}

#[test]
fn consecutive_frames_do_not_share_buffers() {
    let mut h = streaming_harness(mock_1024());

    let first = h.session.read_frame().unwrap();
    let second = h.session.read_frame().unwrap();

    assert_eq!(
        second.internal_frame_counter(),
        first.internal_frame_counter() + 1
    );
    assert_ne!(first.pixels, second.pixels);
}

#[test]
fn reset_forgets_configuration() {
    let mut h = open_harness(mock_1024());
    h.session.configure(&sample_configuration()).unwrap();

    h.session.reset().unwrap();

    assert_eq!(h.session.state(), SessionState::Open);
    assert!(h.session.applied_configuration().is_none());
}

#[test]
fn reset_failure_is_typed() {
    let mut h = open_harness(mock_1024().with_reset_code(-2));
    assert!(matches!(
        h.session.reset(),
        Err(TachyonError::ResetFailed { code: -2 })
    ));
}

#[test]
fn select_camera_checks_index() {
    let mut h = open_harness(mock_1024().with_camera_count(2));

    h.session.select_camera(1).unwrap();
    assert_eq!(h.session.binding().active_camera(), 1);

    assert!(matches!(
        h.session.select_camera(5),
        Err(TachyonError::SelectFailed { index: 5, code: -1 })
    ));
}

#[test]
fn usb_error_is_passed_through() {
    let mut h = harness(mock_1024().with_usb_error("LIBUSB_ERROR_TIMEOUT"));
    assert_eq!(
        h.session.last_usb_error().as_deref(),
        Some("LIBUSB_ERROR_TIMEOUT")
    );
}

#[test]
fn manual_calibration_start_and_stop() {
    let mut h = streaming_harness(mock_1024());

    h.session
        .start_calibration(CalibrationParams::new(24))
        .unwrap();
    assert_eq!(
        h.log.calls(),
        vec![
            BindingCall::CloseShutter,
            BindingCall::Calibrate {
                target: 24,
                auto_off: 1
            },
        ]
    );
    assert_eq!(h.timer.delays(), vec![SHUTTER_SETTLE, CALIBRATION_SETTLE]);
    assert!(h.session.manual_calibration_active());
    assert_eq!(h.session.calibration_phase(), CalibrationPhase::Calibrating);

    h.log.clear();
    h.timer.clear();
    h.session.stop_calibration().unwrap();
    assert_eq!(
        h.log.calls(),
        vec![BindingCall::StopCalibration, BindingCall::OpenShutter]
    );
    assert_eq!(h.timer.delays(), vec![CALIBRATION_SETTLE, SHUTTER_SETTLE]);
    assert!(!h.session.manual_calibration_active());
    assert_eq!(h.session.calibration_phase(), CalibrationPhase::Complete);
}

#[test]
fn manual_calibration_start_failure_reopens_shutter() {
    let mut h = streaming_harness(mock_1024().with_calibrate_code(-2));

    let err = h
        .session
        .start_calibration(CalibrationParams::new(24))
        .unwrap_err();

    assert!(matches!(
        err,
        TachyonError::CalibrationFailed {
            action: "start",
            code: -2
        }
    ));
    assert_eq!(
        h.log.calls(),
        vec![
            BindingCall::CloseShutter,
            BindingCall::Calibrate {
                target: 24,
                auto_off: 1
            },
            BindingCall::OpenShutter,
        ]
    );
    assert_eq!(h.timer.delays(), vec![SHUTTER_SETTLE, SHUTTER_SETTLE]);
    assert_eq!(h.session.calibration_phase(), CalibrationPhase::Aborted);
    assert!(!h.session.manual_calibration_active());
}

#[test]
fn manual_calibration_requires_connection() {
    let mut h = harness(mock_1024());

    assert!(h
        .session
        .start_calibration(CalibrationParams::default())
        .unwrap_err()
        .is_not_connected());
    assert!(h.session.stop_calibration().unwrap_err().is_not_connected());
    assert!(h.log.calls().is_empty());
    assert!(h.timer.delays().is_empty());
}

#[test]
fn sessions_are_independent() {
    let mut a = open_harness(mock_1024());
    let b = harness(MockBinding::new(CameraModel::Tachyon6400));

    a.session.close().unwrap();
    assert!(!a.session.is_connected());
    assert!(b.log.calls().is_empty());
    assert_eq!(b.session.frame_side(), 80);
}
