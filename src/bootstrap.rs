//! Startup sequence: open, identify, load firmware, configure.

use crate::binding::{CameraIdentity, DeviceBinding};
use crate::config::{AppliedConfiguration, TachyonConfig};
use crate::error::Result;
use crate::firmware::FirmwareLoader;
use crate::frame::CameraModel;
use crate::session::Session;
use crate::timing::SettleTimer;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A session that is open and configured, with what was learned on the way.
#[derive(Debug)]
pub struct Bootstrapped<B: DeviceBinding> {
    pub session: Session<B>,
    pub identity: CameraIdentity,
    pub applied: AppliedConfiguration,
}

/// Bring a camera from power-on to configured.
///
/// The model comes from the identity string when it is recognised, else
/// from `config.camera.default_model`. Only a camera identifying itself as a
/// 1024 gets the firmware upload; a loader failure is logged and startup
/// continues. Scripted calibrations on the returned session follow
/// `config.camera.calibration`.
pub fn bootstrap<B: DeviceBinding>(
    binding: B,
    config: &TachyonConfig,
    firmware: &dyn FirmwareLoader,
    timer: Arc<dyn SettleTimer>,
) -> Result<Bootstrapped<B>> {
    let mut session = Session::with_timer(binding, config.camera.default_model, timer);
    session.set_calibration_schedule(config.camera.calibration)?;
    session.open()?;

    if let Some(index) = config.camera.active_camera {
        session.select_camera(index)?;
    }

    let identity = session.identity()?;
    let model = match CameraModel::from_description(&identity.description) {
        Some(model) => model,
        None => {
            warn!(
                description = %identity.description,
                fallback = %config.camera.default_model,
                "Unrecognised camera; using configured model"
            );
            config.camera.default_model
        }
    };

    if identity.description == CameraModel::DESCRIPTION_1024 {
        if config.firmware.enabled {
            if let Err(e) = firmware.load() {
                warn!(error = %e, "Firmware loader failed; continuing");
            }
        } else {
            debug!("Firmware upload disabled");
        }
    }

    session.set_model(model);
    info!(
        %model,
        serial = %identity.serial_number,
        manufacturer = %identity.manufacturer,
        "Camera identified"
    );

    let applied = session.configure(&config.configuration)?;
    Ok(Bootstrapped {
        session,
        identity,
        applied,
    })
}
