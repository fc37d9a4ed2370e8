use crate::errors::Result;
use ndarray::prelude::*;

/// Abstraction over a loaded segmentation model.
///
/// The pipeline depends on this trait rather than on a concrete runtime, so tests can
/// substitute [`crate::mocks::MockEngine`] for ONNX Runtime.
///
/// Implementations must be safe to call from several threads; runtimes that cannot
/// execute concurrently on one session are expected to serialize `infer` internally.
pub trait InferenceEngine: Send + Sync {
    /// Side length S of the square `[1, 3, S, S]` input tensor.
    fn input_size(&self) -> u32;

    /// Run the model on a `[1, 3, S, S]` tensor.
    ///
    /// The output shape is model-defined; callers only rely on it holding one value
    /// per input spatial location.
    fn infer(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>>;
}
