use std::sync::{Arc, Mutex, TryLockError};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::vision::{
    Decision, DetectionResult, Detector, GateOutcome, InferenceEngine, TagGate, TagSource,
    VisionError,
};

/// Everything a shell needs to render or persist one scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub request_id: Uuid,
    pub gate: GateOutcome,
    pub decision: Decision,
    /// `None` when the gate skipped detection.
    pub detection: Option<DetectionResult>,
}

/// Async front door: tag gate first, then detection on a blocking thread.
///
/// Only one scan runs at a time. A second call while one is in flight fails
/// immediately with [`VisionError::Busy`] rather than queueing.
#[derive(Clone)]
pub struct ScanService {
    detector: Arc<Mutex<Detector>>,
    tag_source: Option<Arc<dyn TagSource>>,
    gate: TagGate,
    busy: Arc<Semaphore>,
}

impl ScanService {
    pub fn new(detector: Detector) -> Self {
        Self {
            detector: Arc::new(Mutex::new(detector)),
            tag_source: None,
            gate: TagGate::default(),
            busy: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn with_tag_source(mut self, source: Arc<dyn TagSource>, gate: TagGate) -> Self {
        self.tag_source = Some(source);
        self.gate = gate;
        self
    }

    /// Installs `engine` on a blocking thread; waits out any scan in flight.
    pub async fn load<E: InferenceEngine + 'static>(&self, engine: E) -> Result<(), VisionError> {
        self.with_detector(move |detector| detector.load(engine)).await
    }

    /// Drops the engine on a blocking thread; waits out any scan in flight.
    pub async fn release(&self) -> Result<(), VisionError> {
        self.with_detector(|detector| {
            detector.release();
            Ok(())
        })
        .await
    }

    /// Never blocks. A detector locked by a running scan counts as ready;
    /// `Detector::detect` makes the final call.
    pub fn is_ready(&self) -> bool {
        match self.detector.try_lock() {
            Ok(detector) => detector.is_ready(),
            Err(TryLockError::WouldBlock) => true,
            Err(TryLockError::Poisoned(_)) => false,
        }
    }

    #[instrument(skip(self, image), fields(image_len = image.len()))]
    pub async fn scan(&self, image: Vec<u8>) -> Result<ScanReport, VisionError> {
        let _permit = self
            .busy
            .clone()
            .try_acquire_owned()
            .map_err(|_| VisionError::Busy)?;

        if !self.is_ready() {
            return Err(VisionError::NotReady);
        }

        let request_id = Uuid::new_v4();
        let image: Arc<[u8]> = image.into();

        let gate = self
            .gate
            .evaluate(self.tag_source.as_deref(), image.clone())
            .await;

        if !gate.allows_detection() {
            info!(%request_id, "detection skipped by tag gate");
            return Ok(ScanReport {
                request_id,
                gate,
                decision: Decision::rejected(),
                detection: None,
            });
        }

        let result = self.with_detector(move |detector| detector.detect(&image)).await?;

        info!(
            %request_id,
            tier = ?result.decision.tier,
            detections = result.detections.len(),
            "scan complete"
        );

        Ok(ScanReport {
            request_id,
            gate,
            decision: result.decision.clone(),
            detection: Some(result),
        })
    }

    /// Runs `f` against the locked detector on the blocking pool.
    async fn with_detector<T, F>(&self, f: F) -> Result<T, VisionError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Detector) -> Result<T, VisionError> + Send + 'static,
    {
        let detector = self.detector.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = detector
                .lock()
                .map_err(|_| VisionError::Processing("detector lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| VisionError::Processing(e.to_string()))?
    }
}
