//! CLI entry point for the Tachyon camera driver.
//!
//! # Usage
//!
//! Print camera identity and applied configuration:
//! ```bash
//! tachyon --config tachyon.yml info
//! ```
//!
//! Connect, calibrate, read 5000 frames, disconnect and close:
//! ```bash
//! tachyon run --frames 5000 --target 24
//! ```
//!
//! Manual calibration with a two second dwell:
//! ```bash
//! tachyon calibrate --target 100 --dwell-ms 2000
//! ```
//!
//! Without the `tachyon_sdk` feature a simulated camera is used.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tachyon_daq::acquisition::AcquisitionOptions;
use tachyon_daq::calibration::CalibrationParams;
use tachyon_daq::config::{TachyonConfig, DEFAULT_CONFIG_FILE};
use tachyon_daq::driver::TachyonDriver;
use tachyon_daq::firmware::{FirmwareLoader, JavaFirmwareLoader, NoFirmwareLoader};
use tachyon_daq::frame::CameraModel;
use tachyon_daq::logging;
use tachyon_daq::timing::ThreadSleep;
use tokio::sync::broadcast::error::RecvError;

#[cfg(feature = "tachyon_sdk")]
type Binding = tachyon_daq::ffi::SdkBinding;
#[cfg(not(feature = "tachyon_sdk"))]
type Binding = tachyon_daq::mock::MockBinding;

#[derive(Parser)]
#[command(name = "tachyon")]
#[command(about = "NIT Tachyon infrared camera driver", long_about = None)]
struct Cli {
    /// Camera configuration file
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the camera and print its identity and applied configuration
    Info,

    /// Stream frames, optionally after an offset calibration
    Run {
        /// Number of reads
        #[arg(long, default_value = "5000")]
        frames: u64,

        /// Offset calibration target
        #[arg(long, default_value = "24")]
        target: i32,

        /// Skip the calibration step
        #[arg(long)]
        no_calibrate: bool,
    },

    /// Run an offset calibration only
    Calibrate {
        #[arg(long, default_value = "100")]
        target: i32,

        /// Use manual start/stop with this dwell instead of the scripted run
        #[arg(long)]
        dwell_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = TachyonConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_from_config(&config).map_err(anyhow::Error::msg)?;

    let driver = open_driver(config).await?;
    let result = match cli.command {
        Commands::Info => info(&driver).await,
        Commands::Run {
            frames,
            target,
            no_calibrate,
        } => run(&driver, frames, (!no_calibrate).then(|| CalibrationParams::new(target))).await,
        Commands::Calibrate { target, dwell_ms } => {
            calibrate(&driver, CalibrationParams::new(target), dwell_ms.map(Duration::from_millis))
                .await
        }
    };

    driver.shutdown().await.context("closing camera")?;
    result
}

fn make_binding(model: CameraModel) -> Binding {
    #[cfg(feature = "tachyon_sdk")]
    {
        let _ = model;
        Binding::new()
    }
    #[cfg(not(feature = "tachyon_sdk"))]
    {
        tracing::warn!("tachyon_sdk feature NOT enabled - using simulated camera");
        Binding::new(model)
    }
}

async fn open_driver(config: TachyonConfig) -> Result<TachyonDriver<Binding>> {
    let binding = make_binding(config.camera.default_model);
    let firmware: Arc<dyn FirmwareLoader> = if cfg!(feature = "tachyon_sdk") {
        Arc::new(JavaFirmwareLoader::from_config(&config.firmware))
    } else {
        Arc::new(NoFirmwareLoader)
    };

    let (driver, identity) =
        TachyonDriver::bootstrap(binding, config, firmware, Arc::new(ThreadSleep))
            .await
            .context("starting camera")?;
    println!(
        "Connected to {} (serial {})",
        identity.description, identity.serial_number
    );
    Ok(driver)
}

async fn info(driver: &TachyonDriver<Binding>) -> Result<()> {
    let identity = driver.identity().await?;
    println!("{}", serde_json::to_string_pretty(&identity)?);
    if let Some(applied) = driver.applied_configuration().await? {
        println!("{}", serde_json::to_string_pretty(&applied)?);
    }
    println!("State: {:?}", driver.state().await?);
    Ok(())
}

async fn run(
    driver: &TachyonDriver<Binding>,
    frames: u64,
    calibration: Option<CalibrationParams>,
) -> Result<()> {
    driver.connect().await.context("starting stream")?;

    if let Some(params) = calibration {
        let report = driver.calibrate(params).await?;
        println!(
            "Calibration: {} frames, {} timeouts, {} errors",
            report.frames, report.timeouts, report.errors
        );
    }

    let mut rx = driver.subscribe();
    driver.start_stream(AcquisitionOptions::bounded(frames)).await?;

    let mut last = None;
    loop {
        match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
            Ok(Ok(frame)) => last = Some(frame),
            Ok(Err(RecvError::Lagged(skipped))) => tracing::debug!(skipped, "Frame display lagged"),
            Ok(Err(RecvError::Closed)) => break,
            Err(_) => {}
        }
        if rx.is_empty() && !driver.is_streaming().await {
            break;
        }
    }

    if let Some(stats) = driver.wait_stream().await? {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }
    if let Some(frame) = last {
        println!("{}", frame.header);
        println!("Last frame mean: {:.1}", frame.mean());
        println!("{}", serde_json::to_string(&frame.header)?);
    }
    Ok(())
}

async fn calibrate(
    driver: &TachyonDriver<Binding>,
    params: CalibrationParams,
    dwell: Option<Duration>,
) -> Result<()> {
    driver.connect().await.context("starting stream")?;

    match dwell {
        Some(dwell) => {
            driver.start_calibration(params).await?;
            tokio::time::sleep(dwell).await;
            driver.stop_calibration().await?;
            println!("Manual calibration complete");
        }
        None => {
            let report = driver.calibrate(params).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    driver.disconnect().await?;
    Ok(())
}
