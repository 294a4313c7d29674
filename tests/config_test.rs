//! Loading the camera configuration file with environment overrides.

use std::io::Write;
use tachyon_daq::config::TachyonConfig;
use tachyon_daq::CameraModel;

#[test]
fn environment_overrides_file_values() {
    let mut file = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
    writeln!(
        file,
        "configuration:\n  int_time: 0.0001\n  wait_time: 0.0001\n  bias: 2.0\n  vth_value: 127\n  timeout: 5\ncamera:\n  default_model: \"1024\""
    )
    .unwrap();

    std::env::set_var("TACHYON_CONFIGURATION__VTH_VALUE", "64");
    std::env::set_var("TACHYON_LOGGING__LEVEL", "debug");
    let config = TachyonConfig::load_from(file.path());
    std::env::remove_var("TACHYON_CONFIGURATION__VTH_VALUE");
    std::env::remove_var("TACHYON_LOGGING__LEVEL");

    let config = config.unwrap();
    assert_eq!(config.configuration.vth_value, 64);
    assert_eq!(config.configuration.int_time, 0.0001);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.camera.default_model, CameraModel::Tachyon1024);
}

#[test]
fn shipped_config_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/tachyon.yml");
    let config = TachyonConfig::load_from(path).unwrap();
    assert!(config.firmware.enabled);
    assert_eq!(config.configuration.timeout, 5);
}
