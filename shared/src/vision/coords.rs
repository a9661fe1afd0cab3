use super::filter::ScoredCandidate;
use super::labels::LabelSet;
use super::{BoundingBox, Detection};

/// How a candidate's center/size values are scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxEncoding {
    /// Fractions of the input image, `[0, 1]`.
    Normalized,
    /// Pixels in the square model input, `[0, input_size]`.
    ModelPixels,
}

/// Guesses the encoding from the box center.
///
/// The model output does not say which encoding it uses. Centers at or
/// below `cutoff` on both axes are read as normalized. This misreads real
/// model-pixel boxes sitting in the top-left `cutoff × cutoff` pixels, and is
/// kept only until the export convention of the model is pinned down.
pub fn is_normalized_encoding(center_x: f32, center_y: f32, cutoff: f32) -> bool {
    center_x <= cutoff && center_y <= cutoff
}

/// Maps candidate boxes back onto the source photo.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateMapper {
    image_width: f32,
    image_height: f32,
    input_size: f32,
    normalized_cutoff: f32,
}

impl CoordinateMapper {
    pub fn new(image_width: u32, image_height: u32, input_size: u32, normalized_cutoff: f32) -> Self {
        Self {
            image_width: image_width as f32,
            image_height: image_height as f32,
            input_size: input_size as f32,
            normalized_cutoff,
        }
    }

    pub fn encoding_of(&self, candidate: &ScoredCandidate) -> BoxEncoding {
        if is_normalized_encoding(candidate.center_x, candidate.center_y, self.normalized_cutoff) {
            BoxEncoding::Normalized
        } else {
            BoxEncoding::ModelPixels
        }
    }

    /// Left/top/right/bottom in image pixels, clamped to the image.
    pub fn to_image_box(&self, candidate: &ScoredCandidate) -> BoundingBox {
        let (cx, cy, w, h) = (
            candidate.center_x,
            candidate.center_y,
            candidate.width,
            candidate.height,
        );

        let (left, top, right, bottom) = match self.encoding_of(candidate) {
            BoxEncoding::Normalized => (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
            BoxEncoding::ModelPixels => (
                (cx - w / 2.0) / self.input_size,
                (cy - h / 2.0) / self.input_size,
                (cx + w / 2.0) / self.input_size,
                (cy + h / 2.0) / self.input_size,
            ),
        };

        BoundingBox {
            left: clamp_axis(left * self.image_width, self.image_width),
            top: clamp_axis(top * self.image_height, self.image_height),
            right: clamp_axis(right * self.image_width, self.image_width),
            bottom: clamp_axis(bottom * self.image_height, self.image_height),
        }
    }

    pub fn map(&self, candidate: &ScoredCandidate, labels: &LabelSet) -> Detection {
        Detection {
            label: labels.resolve(candidate.class_id).to_string(),
            class_id: candidate.class_id,
            confidence: candidate.confidence,
            bbox: self.to_image_box(candidate),
        }
    }
}

// f32::clamp passes NaN through; pin it to the lower edge instead
fn clamp_axis(value: f32, max: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, max)
    }
}
