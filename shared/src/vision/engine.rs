use ndarray::Array4;

use super::VisionError;

/// Opaque model runner: normalized image tensor in, flat output tensor out.
///
/// Input is NHWC `[1, input_size, input_size, 3]` in `[0, 1]`. Output is the
/// model's `[1, 4 + classes, candidates]` tensor flattened channel-major.
///
/// `infer` takes `&mut self`: an engine is owned by exactly one
/// [`Detector`](super::Detector) and never runs two requests at once.
pub trait InferenceEngine: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Edge of the square input the model expects.
    fn input_size(&self) -> u32;

    fn infer(&mut self, input: Array4<f32>) -> Result<Vec<f32>, VisionError>;
}

/// Reads the square input edge from NHWC model input dims.
///
/// Returns `None` when height and width are both symbolic (negative), in
/// which case the caller's configured size is used.
pub fn input_edge_from_dims(dims: &[i64]) -> Result<Option<u32>, VisionError> {
    let &[batch, height, width, channels] = dims else {
        return Err(VisionError::ModelMismatch(format!(
            "expected 4D NHWC input, got {}D",
            dims.len()
        )));
    };

    if batch > 1 || (channels >= 0 && channels != 3) {
        return Err(VisionError::ModelMismatch(format!(
            "expected [1, S, S, 3] input, got {dims:?}"
        )));
    }

    let edge = match (height, width) {
        (h, w) if h < 0 && w < 0 => return Ok(None),
        (h, w) if h < 0 => w,
        (h, w) if w < 0 || h == w => h,
        _ => {
            return Err(VisionError::ModelMismatch(format!(
                "input must be square, got {width}x{height}"
            )))
        }
    };

    u32::try_from(edge)
        .ok()
        .filter(|&e| e > 0 && e <= 4096)
        .map(Some)
        .ok_or_else(|| VisionError::ModelMismatch(format!("invalid input edge {edge}")))
}
