//! Detection post-processing: raw YOLO output in, tiered decision out.
//!
//! Stage order is fixed: [`TensorDecoder`] → [`filter`] → [`CoordinateMapper`]
//! → [`non_max_suppression`] → [`DecisionPolicy`]. Each stage is a plain
//! function or value type so it can be tested on its own; [`Detector`] wires
//! them to an [`InferenceEngine`].

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::image_processing::ImageProcessingError;

mod coords;
mod detector;
mod engine;
mod filter;
mod gate;
mod labels;
mod nms;
mod policy;
mod tensor;

#[cfg(feature = "ml")]
mod ort_engine;

pub use coords::{is_normalized_encoding, BoxEncoding, CoordinateMapper};
pub use detector::{postprocess, Detector, DetectionResult, Postprocessed};
pub use engine::{input_edge_from_dims, InferenceEngine};
pub use filter::{best_class, filter_candidates, FilterCandidates, ScoredCandidate};
pub use gate::{GateError, GateOutcome, HttpTagSource, Tag, TagGate, TagSource, DEFAULT_ALLOW_LIST};
pub use labels::{LabelSet, FALLBACK_LABEL, UNKNOWN_LABEL};
pub use nms::{iou, non_max_suppression};
pub use policy::{ConfidenceTier, Decision, DecisionPolicy, TierCutPoints};
pub use tensor::{Candidate, OutputLayout, TensorDecoder, BOX_ROWS};

#[cfg(feature = "ml")]
pub use ort_engine::OrtEngine;

// ============================================================================
// Error Types (sanitized for external consumption)
// ============================================================================

#[derive(thiserror::Error, Debug)]
pub enum VisionError {
    #[error("image preprocessing failed: {0}")]
    Image(#[from] ImageProcessingError),

    #[error("inference engine not ready")]
    NotReady,

    #[error("detector busy with another request")]
    Busy,

    #[error("inference engine error")]
    InferenceEngine(String), // Sanitized - no raw backend errors

    #[error("output shape mismatch: expected {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("invalid output shape: expected {expected}, got {got}")]
    InvalidOutputShape { expected: String, got: String },

    #[error("model configuration mismatch: {0}")]
    ModelMismatch(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("processing error: {0}")]
    Processing(String),
}

#[cfg(feature = "ml")]
impl From<ort::Error> for VisionError {
    fn from(e: ort::Error) -> Self {
        // Log full error internally, return sanitized version externally
        tracing::error!(error = %e, "ORT inference error");
        VisionError::InferenceEngine("internal inference error".into())
    }
}

// ============================================================================
// Detection Result
// ============================================================================

/// Axis-aligned box in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    /// Zero for inverted or degenerate boxes.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use]
pub struct Detection {
    pub label: String,
    /// Class ID from model
    pub class_id: usize,
    /// Best class score (0.0..1.0)
    pub confidence: f32,
    pub bbox: BoundingBox,
}
