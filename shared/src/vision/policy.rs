use serde::{Deserialize, Serialize};

use super::Detection;

/// Trust bucket for the best detection of a request.
///
/// Variants are declared from least to most trusted, so `Ord` follows trust.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    Rejected,
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    /// Shown to the user as a positive result.
    pub const fn is_surfaced(self) -> bool {
        !matches!(self, Self::Rejected)
    }

    /// May be handed to persistence.
    pub const fn is_persistable(self) -> bool {
        matches!(self, Self::High | Self::Medium)
    }

    /// User-facing caveat, if the tier needs one.
    pub const fn warning(self) -> Option<&'static str> {
        match self {
            Self::Medium => Some("Identification is uncertain; please verify before saving."),
            Self::Low => Some("Low confidence; shown for reference only and will not be saved."),
            Self::High | Self::Rejected => None,
        }
    }
}

/// Lower bounds (inclusive) of the surfaced tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierCutPoints {
    pub high: f32,
    pub medium: f32,
    pub low: f32,
}

impl Default for TierCutPoints {
    fn default() -> Self {
        Self {
            high: 0.80,
            medium: 0.65,
            low: 0.50,
        }
    }
}

impl TierCutPoints {
    /// Cut points ordered from most to least trusted.
    pub fn table(&self) -> [(f32, ConfidenceTier); 3] {
        [
            (self.high, ConfidenceTier::High),
            (self.medium, ConfidenceTier::Medium),
            (self.low, ConfidenceTier::Low),
        ]
    }

    pub fn classify(&self, confidence: f32) -> ConfidenceTier {
        self.table()
            .into_iter()
            .find(|&(cut, _)| confidence >= cut)
            .map_or(ConfidenceTier::Rejected, |(_, tier)| tier)
    }
}

/// Outcome of a request: the best detection (if any) and its tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub best: Option<Detection>,
    pub tier: ConfidenceTier,
}

impl Decision {
    pub fn rejected() -> Self {
        Self {
            best: None,
            tier: ConfidenceTier::Rejected,
        }
    }

    /// The detection to show, `None` when rejected.
    pub fn surfaced(&self) -> Option<&Detection> {
        self.best.as_ref().filter(|_| self.tier.is_surfaced())
    }

    /// The detection to persist, `None` unless High or Medium.
    pub fn persistable(&self) -> Option<&Detection> {
        self.best.as_ref().filter(|_| self.tier.is_persistable())
    }

    pub fn warning(&self) -> Option<&'static str> {
        self.tier.warning()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DecisionPolicy {
    cut_points: TierCutPoints,
}

impl DecisionPolicy {
    pub fn new(cut_points: TierCutPoints) -> Self {
        Self { cut_points }
    }

    /// Picks the most confident detection and tiers it.
    ///
    /// A best detection below the lowest cut point is dropped, so a rejected
    /// decision looks exactly like an empty one.
    pub fn decide(&self, detections: &[Detection]) -> Decision {
        let Some(best) = detections
            .iter()
            .reduce(|best, d| if d.confidence > best.confidence { d } else { best })
        else {
            return Decision::rejected();
        };

        match self.cut_points.classify(best.confidence) {
            ConfidenceTier::Rejected => Decision::rejected(),
            tier => Decision {
                best: Some(best.clone()),
                tier,
            },
        }
    }
}
