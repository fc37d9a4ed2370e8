use std::path::Path;

use crate::{
    errors::{BoxError, PrivacutError, Result},
    pipeline::DEFAULT_INPUT_SIZE,
    traits::InferenceEngine,
};
use ndarray::prelude::*;
use ort::{
    execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use parking_lot::Mutex;

/// Knobs for building an [`OrtEngine`].
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// GPU used by the TensorRT/CUDA providers when the matching feature is enabled.
    pub device_id: i32,
    /// Intra-op threads; `0` lets ONNX Runtime decide.
    pub intra_threads: usize,
    /// Run one zero tensor through the model right after loading it.
    pub warm_up: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            device_id: 0,
            intra_threads: 0,
            warm_up: true,
        }
    }
}

/// Segmentation model loaded into ONNX Runtime.
///
/// Input and output names are resolved once, from the first declared input and the
/// first declared output. Models with several inputs or outputs are only supported
/// when those come first.
pub struct OrtEngine {
    input_size: u32,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl OrtEngine {
    pub fn new(model_path: &Path, options: &EngineOptions) -> Result<Self> {
        if !model_path.is_file() {
            return Err(PrivacutError::ModelMissing {
                searched: vec![model_path.to_path_buf()],
            });
        }

        tracing::info!("Loading segmentation model from {}", model_path.display());

        let load_failed =
            |operation: &str, source: BoxError| PrivacutError::model_load(model_path, operation, source);

        let mut builder = Session::builder()
            .map_err(|e| load_failed("session builder", e.into()))?
            .with_execution_providers([
                TensorRTExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
                CUDAExecutionProvider::default()
                    .with_device_id(options.device_id)
                    .build(),
            ])
            .map_err(|e| load_failed("execution provider registration", e.into()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| load_failed("optimization level", e.into()))?
            .with_memory_pattern(true)
            .map_err(|e| load_failed("memory pattern", e.into()))?;
        if options.intra_threads > 0 {
            builder = builder
                .with_intra_threads(options.intra_threads)
                .map_err(|e| load_failed("intra-op threads", e.into()))?;
        }
        let session = builder
            .commit_from_file(model_path)
            .map_err(|e| load_failed("model commit", e.into()))?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| load_failed("input lookup", "model declares no inputs".into()))?;
        let output = session
            .outputs
            .first()
            .ok_or_else(|| load_failed("output lookup", "model declares no outputs".into()))?;
        let input_name = input.name.clone();
        let output_name = output.name.clone();

        // [N, C, S, S]; dynamic axes are reported as -1
        let input_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .and_then(|side| u32::try_from(side).ok())
            .filter(|&side| side > 0)
            .unwrap_or(DEFAULT_INPUT_SIZE);

        tracing::debug!(
            inputs = session.inputs.len(),
            outputs = session.outputs.len(),
            %input_name,
            %output_name,
            input_size,
            "resolved model signature"
        );

        let engine = Self {
            input_size,
            input_name,
            output_name,
            session: Mutex::new(session),
        };

        if options.warm_up {
            let side = input_size as usize;
            let data = Array4::<f32>::zeros((1, 3, side, side));
            engine
                .run(data.view())
                .map_err(|e| load_failed("warm-up run", e.into()))?;
        }

        tracing::info!("Segmentation model loaded ({input_size}x{input_size} input)");
        Ok(engine)
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    fn run(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let input = tensor.as_standard_layout();
        let input = TensorRef::from_array_view(&input)
            .map_err(|e| PrivacutError::inference("input tensor creation", e))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| PrivacutError::inference("session run", e))?;
        let output = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| PrivacutError::inference("output extraction", e))?;

        tracing::debug!(shape = ?output.shape(), "model output");
        Ok(output.to_owned())
    }
}

impl InferenceEngine for OrtEngine {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        self.run(tensor)
    }
}

impl Drop for OrtEngine {
    fn drop(&mut self) {
        tracing::debug!("Releasing segmentation model session");
    }
}
