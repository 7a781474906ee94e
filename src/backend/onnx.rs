//! ONNX Runtime engine for MoveNet single-pose models
//!
//! Feeds the worker's RGB input buffer as a `[1, H, W, 3]` f32 tensor and
//! reads the `[1, 1, 17, 3]` keypoint output into a [`Pose`].

use crate::backend::engine_trait::{EngineLoader, InferenceEngine};
use crate::error::{PipelineError, Result};
use crate::types::{FrameShape, Pose, KEYPOINT_COUNT, KEYPOINT_VALUES};
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;

/// MoveNet Lightning input resolution
pub const MOVENET_LIGHTNING_SIZE: usize = 192;

/// Loads MoveNet models into ONNX Runtime sessions
#[derive(Debug, Clone)]
pub struct OnnxEngineLoader {
    input_shape: FrameShape,
    intra_threads: usize,
}

impl Default for OnnxEngineLoader {
    fn default() -> Self {
        Self::new(FrameShape::rgb(MOVENET_LIGHTNING_SIZE, MOVENET_LIGHTNING_SIZE))
    }
}

impl OnnxEngineLoader {
    pub fn new(input_shape: FrameShape) -> Self {
        Self {
            input_shape,
            intra_threads: 1,
        }
    }

    /// Threads ONNX Runtime may use inside one inference
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }
}

impl EngineLoader for OnnxEngineLoader {
    fn load(&self, model_path: &Path, device_id: u32) -> Result<Box<dyn InferenceEngine>> {
        let init_error = |e: ort::Error| PipelineError::InitFailed {
            device_id,
            message: format!("failed to load {:?}: {}", model_path, e),
        };

        let session = Session::builder()
            .map_err(init_error)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(init_error)?
            .with_intra_threads(self.intra_threads)
            .map_err(init_error)?
            .commit_from_file(model_path)
            .map_err(init_error)?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| PipelineError::InitFailed {
                device_id,
                message: "model has no inputs".to_string(),
            })?;
        let output_name = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| PipelineError::InitFailed {
                device_id,
                message: "model has no outputs".to_string(),
            })?;

        tracing::debug!(
            "Loaded {:?} on device {} (input {:?}, output {:?})",
            model_path,
            device_id,
            input_name,
            output_name
        );

        Ok(Box::new(OnnxEngine {
            session,
            input_shape: self.input_shape,
            input_name,
            output_name,
        }))
    }
}

/// One ONNX Runtime session
pub struct OnnxEngine {
    session: Session,
    input_shape: FrameShape,
    input_name: String,
    output_name: String,
}

impl InferenceEngine for OnnxEngine {
    fn input_shape(&self) -> FrameShape {
        self.input_shape
    }

    fn invoke(&mut self, input: &[u8], output: &mut Pose) -> Result<()> {
        let FrameShape { height, width, .. } = self.input_shape;
        let values: Vec<f32> = input.iter().map(|&b| b as f32).collect();
        let array = Array4::from_shape_vec((1, height, width, 3), values)
            .map_err(|e| PipelineError::Engine(format!("input tensor: {}", e)))?;

        let tensor = Tensor::from_array(array)
            .map_err(|e| PipelineError::Engine(format!("input tensor: {}", e)))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => tensor])
            .map_err(|e| PipelineError::Engine(format!("inference failed: {}", e)))?;

        let keypoints: ndarray::ArrayViewD<f32> = outputs[self.output_name.as_str()]
            .try_extract_array()
            .map_err(|e| PipelineError::Engine(format!("output tensor: {}", e)))?;

        // [1, 1, 17, 3] row-major: (row, col, confidence) per keypoint
        let flat: Vec<f32> = keypoints.iter().copied().collect();
        let expected = KEYPOINT_COUNT * KEYPOINT_VALUES;
        *output = flat
            .get(..expected)
            .and_then(Pose::from_flat)
            .ok_or_else(|| {
                PipelineError::Engine(format!(
                    "expected {} output values, got {}",
                    expected,
                    flat.len()
                ))
            })?;
        Ok(())
    }

    fn name(&self) -> &str {
        "onnx"
    }
}
