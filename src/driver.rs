//! Async facade over a blocking [`Session`].
//!
//! Every call runs on the tokio blocking pool. Streaming holds the session
//! lock for its whole duration and publishes frames on a broadcast channel;
//! other calls wait until the stream stops. Dropping the driver cancels a
//! running stream; the camera is stopped once the current read returns.

use crate::acquisition::{acquire, AcquisitionOptions, AcquisitionStats};
use crate::binding::{CameraIdentity, DeviceBinding};
use crate::bootstrap::{bootstrap, Bootstrapped};
use crate::calibration::{CalibrationParams, CalibrationReport};
use crate::config::{AppliedConfiguration, CameraConfiguration, TachyonConfig};
use crate::error::Result;
use crate::firmware::FirmwareLoader;
use crate::frame::Frame;
use crate::session::{Session, SessionState};
use crate::timing::SettleTimer;
use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the frame broadcast channel.
pub const FRAME_CHANNEL_CAPACITY: usize = 16;

type StreamHandle = JoinHandle<Result<AcquisitionStats>>;

pub struct TachyonDriver<B: DeviceBinding + 'static> {
    session: Arc<Mutex<Session<B>>>,
    frame_tx: broadcast::Sender<Arc<Frame>>,
    frame_count: Arc<AtomicU64>,
    cancel: Arc<AtomicBool>,
    stream: tokio::sync::Mutex<Option<StreamHandle>>,
}

impl<B: DeviceBinding + 'static> TachyonDriver<B> {
    pub fn new(session: Session<B>) -> Self {
        let (frame_tx, _) = broadcast::channel(FRAME_CHANNEL_CAPACITY);
        Self {
            session: Arc::new(Mutex::new(session)),
            frame_tx,
            frame_count: Arc::new(AtomicU64::new(0)),
            cancel: Arc::new(AtomicBool::new(false)),
            stream: tokio::sync::Mutex::new(None),
        }
    }

    /// Run the startup sequence on the blocking pool.
    pub async fn bootstrap(
        binding: B,
        config: TachyonConfig,
        firmware: Arc<dyn FirmwareLoader>,
        timer: Arc<dyn SettleTimer>,
    ) -> Result<(Self, CameraIdentity)> {
        let Bootstrapped {
            session, identity, ..
        } = tokio::task::spawn_blocking(move || {
            bootstrap(binding, &config, firmware.as_ref(), timer)
        })
        .await??;
        Ok((Self::new(session), identity))
    }

    /// Run `f` against the session on the blocking pool.
    async fn with_session<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Session<B>) -> Result<T> + Send + 'static,
    {
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || f(&mut *session.lock())).await?
    }

    pub async fn state(&self) -> Result<SessionState> {
        self.with_session(|s| Ok(s.state())).await
    }

    pub async fn identity(&self) -> Result<CameraIdentity> {
        self.with_session(|s| s.identity()).await
    }

    pub async fn applied_configuration(&self) -> Result<Option<AppliedConfiguration>> {
        self.with_session(|s| Ok(s.applied_configuration().copied()))
            .await
    }

    pub async fn configure(&self, values: CameraConfiguration) -> Result<AppliedConfiguration> {
        self.with_session(move |s| s.configure(&values)).await
    }

    pub async fn connect(&self) -> Result<()> {
        self.with_session(|s| s.connect()).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.with_session(|s| s.disconnect()).await
    }

    pub async fn read_frame(&self) -> Result<Frame> {
        self.with_session(|s| s.read_frame()).await
    }

    pub async fn calibrate(&self, params: CalibrationParams) -> Result<CalibrationReport> {
        self.with_session(move |s| s.calibrate(params)).await
    }

    pub async fn start_calibration(&self, params: CalibrationParams) -> Result<()> {
        self.with_session(move |s| s.start_calibration(params)).await
    }

    pub async fn stop_calibration(&self) -> Result<()> {
        self.with_session(|s| s.stop_calibration()).await
    }

    /// Receiver for frames produced by [`TachyonDriver::start_stream`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Frame>> {
        self.frame_tx.subscribe()
    }

    /// Frames published since the driver was created.
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    pub async fn is_streaming(&self) -> bool {
        self.stream
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stream frames in the background until the bound is reached or
    /// [`TachyonDriver::stop_stream`] is called.
    ///
    /// Connects first unless the camera is already streaming. Streaming is
    /// stopped on the camera when the loop exits.
    pub async fn start_stream(&self, options: AcquisitionOptions) -> Result<()> {
        let mut stream = self.stream.lock().await;
        if stream.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Stream already running");
            return Ok(());
        }

        self.cancel.store(false, Ordering::Release);
        let session = Arc::clone(&self.session);
        let cancel = Arc::clone(&self.cancel);
        let frame_tx = self.frame_tx.clone();
        let frame_count = Arc::clone(&self.frame_count);
        let frames = options.frames;

        *stream = Some(tokio::task::spawn_blocking(move || {
            let mut session = session.lock();
            if session.state() != SessionState::Streaming {
                session.connect()?;
            }

            let result = acquire(&mut *session, &options, &cancel, |frame| {
                frame_count.fetch_add(1, Ordering::Relaxed);
                // No receivers is fine
                let _ = frame_tx.send(Arc::new(frame));
                ControlFlow::Continue(())
            });

            if let Err(e) = session.disconnect() {
                warn!(error = %e, "Failed to stop streaming after acquisition");
            }
            result
        }));
        info!(frames = ?frames, "Stream started");
        Ok(())
    }

    /// Wait for a bounded stream to finish on its own.
    pub async fn wait_stream(&self) -> Result<Option<AcquisitionStats>> {
        let handle = self.stream.lock().await.take();
        match handle {
            Some(handle) => Ok(Some(handle.await??)),
            None => Ok(None),
        }
    }

    /// Cancel the stream between reads and wait for it to wind down.
    pub async fn stop_stream(&self) -> Result<Option<AcquisitionStats>> {
        self.cancel.store(true, Ordering::Release);
        let stats = self.wait_stream().await?;
        if stats.is_some() {
            info!("Stream stopped");
        }
        Ok(stats)
    }

    /// Stop any stream and close the camera.
    pub async fn shutdown(&self) -> Result<()> {
        self.stop_stream().await?;
        self.with_session(|s| s.close()).await
    }
}

impl<B: DeviceBinding + 'static> Drop for TachyonDriver<B> {
    fn drop(&mut self) {
        // A running stream task exits after its current read.
        self.cancel.store(true, Ordering::Release);
    }
}
