use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::image_processing::ProcessingConfig;
use crate::vision::{OutputLayout, TierCutPoints};

/// Square model input edge, in pixels.
pub const DEFAULT_INPUT_SIZE: u32 = 640;

/// Classes emitted by the deployed plant model.
pub const DEFAULT_NUM_CLASSES: usize = 15;

/// Anchor columns in the model output (80² + 40² + 20²).
pub const DEFAULT_NUM_CANDIDATES: usize = 8400;

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;

/// Box centers at or below this value on both axes are read as normalized.
pub const DEFAULT_NORMALIZED_CUTOFF: f32 = 1.5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("tier cut points must satisfy low <= medium <= high, got {low}/{medium}/{high}")]
    UnorderedTiers { low: f32, medium: f32, high: f32 },

    #[error("{0} must be non-zero")]
    Zero(&'static str),

    #[error("normalized cutoff must be positive and finite, got {0}")]
    InvalidCutoff(f32),
}

/// Named configuration for the whole detection pipeline.
///
/// Every field has a deployment default, so a partial JSON document only
/// needs to name the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub input_size: u32,
    pub num_classes: usize,
    pub num_candidates: usize,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub normalized_cutoff: f32,
    pub tiers: TierCutPoints,
    pub processing: ProcessingConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            num_classes: DEFAULT_NUM_CLASSES,
            num_candidates: DEFAULT_NUM_CANDIDATES,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            normalized_cutoff: DEFAULT_NORMALIZED_CUTOFF,
            tiers: TierCutPoints::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl DetectionConfig {
    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(self.num_classes, self.num_candidates)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_size == 0 {
            return Err(ConfigError::Zero("input_size"));
        }
        if self.num_classes == 0 {
            return Err(ConfigError::Zero("num_classes"));
        }
        if self.num_candidates == 0 {
            return Err(ConfigError::Zero("num_candidates"));
        }

        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("iou_threshold", self.iou_threshold)?;
        check_unit("tiers.high", self.tiers.high)?;
        check_unit("tiers.medium", self.tiers.medium)?;
        check_unit("tiers.low", self.tiers.low)?;

        if !(self.tiers.low <= self.tiers.medium && self.tiers.medium <= self.tiers.high) {
            return Err(ConfigError::UnorderedTiers {
                low: self.tiers.low,
                medium: self.tiers.medium,
                high: self.tiers.high,
            });
        }

        if !self.normalized_cutoff.is_finite() || self.normalized_cutoff <= 0.0 {
            return Err(ConfigError::InvalidCutoff(self.normalized_cutoff));
        }

        Ok(())
    }
}

fn check_unit(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_nan() || !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { name, value });
    }
    Ok(())
}
