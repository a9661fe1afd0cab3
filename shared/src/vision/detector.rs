use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::DetectionConfig;
use crate::image_processing::Preprocessor;

use super::coords::CoordinateMapper;
use super::engine::InferenceEngine;
use super::filter::filter_candidates;
use super::labels::LabelSet;
use super::nms::non_max_suppression;
use super::policy::{Decision, DecisionPolicy};
use super::tensor::{OutputLayout, TensorDecoder};
use super::{Detection, VisionError};

/// Detections after suppression plus how many entered it.
#[derive(Debug, Clone, PartialEq)]
pub struct Postprocessed {
    pub detections: Vec<Detection>,
    pub candidates_before_nms: usize,
}

/// Runs decode → filter → map → NMS over a raw output buffer.
///
/// # Errors
///
/// Only [`VisionError::ShapeMismatch`]; an output with no confident
/// candidate is an empty, successful result.
pub fn postprocess(
    raw: &[f32],
    layout: OutputLayout,
    image_size: (u32, u32),
    config: &DetectionConfig,
    labels: &LabelSet,
) -> Result<Postprocessed, VisionError> {
    let decoder = TensorDecoder::new(raw, layout)?;
    let mapper = CoordinateMapper::new(
        image_size.0,
        image_size.1,
        config.input_size,
        config.normalized_cutoff,
    );

    let candidates: Vec<Detection> =
        filter_candidates(decoder.candidates(), config.confidence_threshold)
            .map(|scored| mapper.map(&scored, labels))
            .collect();

    let candidates_before_nms = candidates.len();
    let detections = non_max_suppression(candidates, config.iou_threshold);

    Ok(Postprocessed {
        detections,
        candidates_before_nms,
    })
}

/// Metadata about the detection run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[must_use]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub decision: Decision,
    /// Number of candidates before NMS
    pub candidates_before_nms: usize,
    pub image_width: u32,
    pub image_height: u32,
    pub preprocess_ms: f64,
    pub inference_ms: f64,
    pub postprocess_ms: f64,
}

/// Plant detector owning the loaded model.
///
/// Constructed empty; [`load`](Self::load) installs an engine and
/// [`release`](Self::release) drops it. Detection outside that window fails
/// with [`VisionError::NotReady`].
pub struct Detector {
    engine: Option<Box<dyn InferenceEngine>>,
    config: DetectionConfig,
    labels: LabelSet,
    preprocessor: Preprocessor,
    policy: DecisionPolicy,
}

impl Detector {
    /// Builds an unloaded detector.
    ///
    /// # Errors
    ///
    /// [`VisionError::Config`] when `config` fails
    /// [`DetectionConfig::validate`].
    pub fn new(config: DetectionConfig, labels: LabelSet) -> Result<Self, VisionError> {
        config.validate()?;
        labels.check_against(config.num_classes);
        let preprocessor = Preprocessor::new(config.processing.clone(), config.input_size);
        let policy = DecisionPolicy::new(config.tiers);

        Ok(Self {
            engine: None,
            config,
            labels,
            preprocessor,
            policy,
        })
    }

    /// Installs `engine`, replacing (and dropping) any previous one.
    ///
    /// # Errors
    ///
    /// [`VisionError::ModelMismatch`] when the engine's input edge differs
    /// from the configured `input_size`.
    pub fn load<E: InferenceEngine + 'static>(&mut self, engine: E) -> Result<(), VisionError> {
        if engine.input_size() != self.config.input_size {
            return Err(VisionError::ModelMismatch(format!(
                "engine '{}' expects {}px input, config says {}px",
                engine.name(),
                engine.input_size(),
                self.config.input_size
            )));
        }

        info!(engine = engine.name(), "inference engine loaded");
        self.engine = Some(Box::new(engine));
        Ok(())
    }

    /// Drops the engine. Later calls to [`detect`](Self::detect) fail until
    /// another [`load`](Self::load).
    pub fn release(&mut self) {
        if let Some(engine) = self.engine.take() {
            info!(engine = engine.name(), "inference engine released");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    /// Runs detection on an encoded photo.
    ///
    /// # Errors
    ///
    /// `NotReady` without a loaded engine, `Image` for undecodable input,
    /// `ShapeMismatch` when the engine output does not fit the layout.
    #[instrument(skip(self, image_data), fields(data_len = image_data.len()))]
    pub fn detect(&mut self, image_data: &[u8]) -> Result<DetectionResult, VisionError> {
        let engine = self.engine.as_mut().ok_or(VisionError::NotReady)?;

        let preprocess_start = Instant::now();
        let prepared = self.preprocessor.prepare(image_data)?;
        let preprocess_ms = preprocess_start.elapsed().as_secs_f64() * 1000.0;

        let inference_start = Instant::now();
        let raw = engine.infer(prepared.tensor)?;
        let inference_ms = inference_start.elapsed().as_secs_f64() * 1000.0;

        let postprocess_start = Instant::now();
        let Postprocessed {
            detections,
            candidates_before_nms,
        } = postprocess(
            &raw,
            self.config.layout(),
            (prepared.width, prepared.height),
            &self.config,
            &self.labels,
        )?;
        let decision = self.policy.decide(&detections);
        let postprocess_ms = postprocess_start.elapsed().as_secs_f64() * 1000.0;

        debug!(
            detections = detections.len(),
            candidates_before_nms,
            tier = ?decision.tier,
            preprocess_ms,
            inference_ms,
            postprocess_ms,
            "Detection completed"
        );

        Ok(DetectionResult {
            detections,
            decision,
            candidates_before_nms,
            image_width: prepared.width,
            image_height: prepared.height,
            preprocess_ms,
            inference_ms,
            postprocess_ms,
        })
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        self.release();
    }
}
