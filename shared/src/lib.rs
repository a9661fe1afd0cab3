// lib.rs - plant detection core shared by the mobile shells

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod image_processing;
pub mod service;
pub mod vision;

pub use config::{ConfigError, DetectionConfig};
pub use image_processing::{ImageProcessingError, PreparedImage, Preprocessor, ProcessingConfig};
pub use service::{ScanReport, ScanService};
pub use vision::{
    BoundingBox, ConfidenceTier, Decision, DecisionPolicy, Detection, DetectionResult, Detector,
    GateOutcome, HttpTagSource, InferenceEngine, LabelSet, Tag, TagGate, TagSource, VisionError,
};

#[cfg(feature = "ml")]
pub use vision::OrtEngine;
