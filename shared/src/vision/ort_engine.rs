use std::path::Path;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Tensor;
use tracing::{debug, instrument, warn};

use super::engine::{input_edge_from_dims, InferenceEngine};
use super::tensor::OutputLayout;
use super::VisionError;

/// ONNX Runtime backend for the plant model.
pub struct OrtEngine {
    session: Session,
    input_size: u32,
    layout: OutputLayout,
}

impl OrtEngine {
    /// Creates an engine from ONNX model bytes.
    ///
    /// # Errors
    ///
    /// Returns error if model cannot be loaded or has unexpected structure.
    #[instrument(skip(model_bytes), fields(model_size = model_bytes.len()))]
    pub fn from_memory(
        model_bytes: &[u8],
        input_size: u32,
        layout: OutputLayout,
    ) -> Result<Self, VisionError> {
        let session = Session::builder()?.commit_from_memory(model_bytes)?;
        Self::with_session(session, input_size, layout)
    }

    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn from_file(
        path: impl AsRef<Path>,
        input_size: u32,
        layout: OutputLayout,
    ) -> Result<Self, VisionError> {
        let session = Session::builder()?.commit_from_file(path.as_ref())?;
        Self::with_session(session, input_size, layout)
    }

    /// Checks the model's declared tensors against `layout`.
    ///
    /// A static input edge on the model overrides `input_size`, so a config
    /// that disagrees with the model is caught by `Detector::load`.
    fn with_session(
        session: Session,
        input_size: u32,
        layout: OutputLayout,
    ) -> Result<Self, VisionError> {
        if session.inputs.len() != 1 {
            return Err(VisionError::ModelMismatch(format!(
                "expected 1 input, model has {}",
                session.inputs.len()
            )));
        }
        let input = &session.inputs[0];
        let output = session
            .outputs
            .first()
            .ok_or_else(|| VisionError::ModelMismatch("Model has no outputs".into()))?;

        let input_dims: Vec<i64> = input
            .input_type
            .tensor_dimensions()
            .ok_or_else(|| VisionError::ModelMismatch("Input is not a tensor".into()))?
            .collect();
        let output_dims: Vec<i64> = output
            .output_type
            .tensor_dimensions()
            .ok_or_else(|| VisionError::ModelMismatch("Output is not a tensor".into()))?
            .collect();

        let model_edge = input_edge_from_dims(&input_dims)?;
        layout.check_output_dims(&output_dims)?;

        if let Some(edge) = model_edge.filter(|&edge| edge != input_size) {
            warn!(model = edge, configured = input_size, "model input edge differs from config");
        }
        let input_size = model_edge.unwrap_or(input_size);

        debug!(
            input = %input.name,
            output = %output.name,
            ?input_dims,
            ?output_dims,
            input_size,
            "Model loaded successfully"
        );

        Ok(Self {
            session,
            input_size,
            layout,
        })
    }
}

impl InferenceEngine for OrtEngine {
    fn name(&self) -> &'static str {
        "onnxruntime"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&mut self, input: Array4<f32>) -> Result<Vec<f32>, VisionError> {
        let shape: Vec<i64> = input.shape().iter().map(|&d| d as i64).collect();
        let data: Vec<f32> = input.iter().copied().collect();
        let input_value = Tensor::from_array((shape, data))?;

        let outputs = self.session.run(ort::inputs![input_value])?;
        let (shape, data) = outputs[0].try_extract_tensor::<f32>()?;

        self.layout.check_output_dims(&shape[..])?;
        if data.len() != self.layout.expected_len() {
            return Err(VisionError::ShapeMismatch {
                expected: self.layout.expected_len(),
                got: data.len(),
            });
        }

        Ok(data.to_vec())
    }
}
