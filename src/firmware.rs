//! FPGA firmware loading.
//!
//! 1024-pixel cameras need their bitstream uploaded by the vendor's Java
//! tool before the first acquisition. The upload is fire-and-forget: the exit
//! status is logged, never acted upon.

use crate::config::FirmwareSection;
use crate::error::{Result, TachyonError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::{info, warn};

/// Strategy for uploading firmware at startup.
///
/// An error means the upload could not be attempted. A loader that ran and
/// reported failure is not an error.
pub trait FirmwareLoader: Send + Sync {
    fn load(&self) -> Result<()>;
}

/// Runs `java -cp FWLoader.jar FWLoader -c -uf <bitstream>`.
#[derive(Debug, Clone)]
pub struct JavaFirmwareLoader {
    java: PathBuf,
    jar: PathBuf,
    bitstream: PathBuf,
}

impl JavaFirmwareLoader {
    pub fn new(java: impl Into<PathBuf>, jar: impl Into<PathBuf>, bitstream: impl Into<PathBuf>) -> Self {
        Self {
            java: java.into(),
            jar: jar.into(),
            bitstream: bitstream.into(),
        }
    }

    pub fn from_config(section: &FirmwareSection) -> Self {
        Self::new(&section.java, &section.jar, &section.bitstream)
    }

    /// The command line that [`FirmwareLoader::load`] runs.
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.java);
        cmd.arg("-cp")
            .arg(&self.jar)
            .arg("FWLoader")
            .arg("-c")
            .arg("-uf")
            .arg(&self.bitstream);
        cmd
    }
}

impl Default for JavaFirmwareLoader {
    fn default() -> Self {
        Self::from_config(&FirmwareSection::default())
    }
}

impl FirmwareLoader for JavaFirmwareLoader {
    fn load(&self) -> Result<()> {
        info!(
            jar = %self.jar.display(),
            bitstream = %self.bitstream.display(),
            "Uploading camera firmware"
        );
        let status = self
            .command()
            .status()
            .map_err(|e| TachyonError::Firmware {
                message: format!("failed to launch {}: {e}", self.java.display()),
            })?;
        if status.success() {
            info!("Firmware loader finished");
        } else {
            warn!(%status, "Firmware loader exited with failure");
        }
        Ok(())
    }
}

/// Skips the upload, e.g. when firmware is disabled in the config.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFirmwareLoader;

impl FirmwareLoader for NoFirmwareLoader {
    fn load(&self) -> Result<()> {
        Ok(())
    }
}

/// Counts invocations instead of spawning a process.
#[derive(Debug, Default, Clone)]
pub struct RecordingFirmwareLoader {
    calls: Arc<Mutex<usize>>,
}

impl RecordingFirmwareLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock()
    }
}

impl FirmwareLoader for RecordingFirmwareLoader {
    fn load(&self) -> Result<()> {
        *self.calls.lock() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_command_line() {
        let loader = JavaFirmwareLoader::default();
        let cmd = loader.command();
        assert_eq!(cmd.get_program(), "java");
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            ["-cp", "FWLoader.jar", "FWLoader", "-c", "-uf", "nit_tachyon_32_HS.bit"]
        );
    }

    #[test]
    fn missing_executable_is_an_error() {
        let loader = JavaFirmwareLoader::new(
            "/nonexistent/bin/java-for-tachyon",
            "FWLoader.jar",
            "nit_tachyon_32_HS.bit",
        );
        assert!(matches!(
            loader.load(),
            Err(TachyonError::Firmware { message }) if message.contains("java-for-tachyon")
        ));
    }

    #[test]
    fn recording_loader_counts() {
        let loader = RecordingFirmwareLoader::new();
        let shared = loader.clone();
        loader.load().unwrap();
        assert_eq!(shared.calls(), 1);
    }
}
