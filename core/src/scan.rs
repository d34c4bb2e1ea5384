//! Food-scan session: a bound camera feeding frames to an analyzer.
//!
//! Frames go through a single-slot `watch` channel, so a slow analyzer only
//! ever sees the newest frame and older ones are dropped. The camera is held
//! by a guard that unbinds it whenever the session ends, however it ends.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
}

impl Frame {
    #[must_use]
    pub fn new(sequence: u64, width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            sequence,
            width,
            height,
            data: data.into(),
        }
    }
}

/// A food recognised in a frame, with nutrition for one serving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub food_name: String,
    pub calories: f64,
    pub protein: f64,
    pub carbs: f64,
    pub fat: f64,
    #[serde(default)]
    pub serving_size: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("Food analyzer unavailable: {0}")]
    ProviderUnavailable(String),
    #[error("No camera available")]
    NoCamera,
    #[error("Camera binding failed: {0}")]
    BindingFailed(String),
    #[error("Frame analysis failed: {0}")]
    AnalyzerFailed(String),
}

/// Black-box recognizer. Runs on the blocking pool, one frame at a time.
pub trait FoodAnalyzer: Send + Sync + 'static {
    fn is_available(&self) -> bool {
        true
    }

    fn analyze(&self, frame: &Frame) -> anyhow::Result<Option<Detection>>;
}

pub trait CameraSource: Send + 'static {
    fn bind(&mut self) -> Result<(), ScanError>;
    fn unbind(&mut self);
}

pub trait ScanListener: Send + Sync + 'static {
    fn on_detection(&self, detection: &Detection);
    fn on_error(&self, error: &ScanError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The worker drained its last frame within the grace period.
    Graceful,
    /// The grace period ran out and the worker was aborted.
    ForcedCancel,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    analyzed: AtomicU64,
    detections: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub submitted: u64,
    pub analyzed: u64,
    pub detections: u64,
}

impl ScanStats {
    /// Frames replaced in the slot before the analyzer got to them.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.submitted.saturating_sub(self.analyzed)
    }
}

struct CameraGuard {
    camera: Box<dyn CameraSource>,
}

impl CameraGuard {
    /// Bind the camera. On failure the guard is dropped, which unbinds.
    fn bind(mut camera: Box<dyn CameraSource>) -> Result<Self, ScanError> {
        let result = camera.bind();
        let guard = CameraGuard { camera };
        result.map(|()| guard)
    }
}

impl Drop for CameraGuard {
    fn drop(&mut self) {
        self.camera.unbind();
        debug!("Camera unbound");
    }
}

pub struct ScanSession {
    frames: Option<watch::Sender<Option<Frame>>>,
    worker: Option<JoinHandle<()>>,
    camera: Option<CameraGuard>,
    counters: Arc<Counters>,
}

impl ScanSession {
    /// Bind `camera` and start the analysis worker on the current Tokio runtime.
    ///
    /// Start-up failures are reported to `listener` as well as returned, and
    /// leave the camera unbound.
    pub fn start(
        camera: Box<dyn CameraSource>,
        analyzer: Arc<dyn FoodAnalyzer>,
        listener: Arc<dyn ScanListener>,
    ) -> Result<Self, ScanError> {
        let fail = |err: ScanError| {
            warn!("Scan session failed to start: {err}");
            listener.on_error(&err);
            err
        };

        if !analyzer.is_available() {
            return Err(fail(ScanError::ProviderUnavailable(
                "analyzer reported not ready".to_string(),
            )));
        }
        let guard = CameraGuard::bind(camera).map_err(fail)?;
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| fail(ScanError::BindingFailed(e.to_string())))?;

        let (tx, rx) = watch::channel(None);
        let counters = Arc::new(Counters::default());
        let worker = handle.spawn(run_worker(
            rx,
            analyzer,
            Arc::clone(&listener),
            Arc::clone(&counters),
        ));
        debug!("Scan session started");

        Ok(Self {
            frames: Some(tx),
            worker: Some(worker),
            camera: Some(guard),
            counters,
        })
    }

    /// Hand a frame to the analyzer, replacing any frame still waiting.
    pub fn submit_frame(&self, frame: Frame) {
        if let Some(tx) = &self.frames {
            tx.send_replace(Some(frame));
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn stats(&self) -> ScanStats {
        ScanStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            analyzed: self.counters.analyzed.load(Ordering::Relaxed),
            detections: self.counters.detections.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting frames, give the worker up to `grace` to finish, then
    /// abort it. The camera is unbound in every case.
    ///
    /// An analyzer call already running on the blocking pool is not
    /// interrupted, but its result is discarded after a forced cancel.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownOutcome {
        self.frames.take();
        let outcome = match self.worker.take() {
            Some(mut worker) => {
                if tokio::time::timeout(grace, &mut worker).await.is_ok() {
                    ShutdownOutcome::Graceful
                } else {
                    warn!("Scan worker did not stop within {grace:?}; cancelling");
                    worker.abort();
                    let _ = worker.await;
                    ShutdownOutcome::ForcedCancel
                }
            }
            None => ShutdownOutcome::Graceful,
        };
        self.camera.take();
        outcome
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

async fn run_worker(
    mut frames: watch::Receiver<Option<Frame>>,
    analyzer: Arc<dyn FoodAnalyzer>,
    listener: Arc<dyn ScanListener>,
    counters: Arc<Counters>,
) {
    while frames.changed().await.is_ok() {
        let Some(frame) = frames.borrow_and_update().clone() else {
            continue;
        };
        let sequence = frame.sequence;
        let analyzer = Arc::clone(&analyzer);
        let result = tokio::task::spawn_blocking(move || analyzer.analyze(&frame)).await;
        counters.analyzed.fetch_add(1, Ordering::Relaxed);

        let error = match result {
            Ok(Ok(Some(detection))) => {
                counters.detections.fetch_add(1, Ordering::Relaxed);
                listener.on_detection(&detection);
                None
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => Some(ScanError::AnalyzerFailed(format!("{e:#}"))),
            Err(e) => Some(ScanError::AnalyzerFailed(e.to_string())),
        };
        if let Some(err) = error {
            warn!("Frame {sequence}: {err}");
            listener.on_error(&err);
        }
    }
    debug!("Scan worker finished");
}
