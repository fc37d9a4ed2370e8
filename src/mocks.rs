use crate::errors::{PrivacutError, Result};
use crate::traits::InferenceEngine;
use ndarray::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What the mock engine answers with.
#[derive(Debug, Clone)]
pub enum MockOutput {
    /// Every output value equals the given constant.
    Constant(f32),
    /// Output value equals the column index, so the mask ramps from left to right.
    HorizontalGradient,
    /// Every call fails as if the runtime rejected the tensor.
    Fail,
}

/// Inference engine for tests.
///
/// Produces `[1, 1, S, S]` outputs without touching ONNX Runtime and counts how many
/// times it was asked to run.
#[derive(Debug)]
pub struct MockEngine {
    pub input_size: u32,
    pub output: MockOutput,
    calls: AtomicUsize,
}

impl MockEngine {
    pub const fn new(input_size: u32, output: MockOutput) -> Self {
        Self {
            input_size,
            output,
            calls: AtomicUsize::new(0),
        }
    }

    pub const fn constant(input_size: u32, value: f32) -> Self {
        Self::new(input_size, MockOutput::Constant(value))
    }

    pub const fn gradient(input_size: u32) -> Self {
        Self::new(input_size, MockOutput::HorizontalGradient)
    }

    pub const fn failing(input_size: u32) -> Self {
        Self::new(input_size, MockOutput::Fail)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for MockEngine {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn infer(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let shape = tensor.shape();
        let (batch, height, width) = (shape[0], shape[2], shape[3]);

        let output = match self.output {
            MockOutput::Constant(value) => Array4::from_elem((batch, 1, height, width), value),
            MockOutput::HorizontalGradient => {
                Array4::from_shape_fn((batch, 1, height, width), |(_, _, _, x)| x as f32)
            }
            MockOutput::Fail => {
                return Err(PrivacutError::inference(
                    "session run",
                    "mock engine configured to fail",
                ))
            }
        };
        Ok(output.into_dyn())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_engine_output_shape() -> Result<()> {
        let mock = MockEngine::constant(8, 0.25);
        let input = Array4::<f32>::zeros((1, 3, 8, 8));

        let output = mock.infer(input.view())?;

        assert_eq!(output.shape(), &[1, 1, 8, 8]);
        assert!(output.iter().all(|&v| v == 0.25));
        assert_eq!(mock.calls(), 1);
        Ok(())
    }

    #[test]
    fn test_mock_engine_gradient_and_failure() {
        let input = Array4::<f32>::zeros((1, 3, 4, 4));

        let output = MockEngine::gradient(4).infer(input.view()).unwrap();
        assert_eq!(output[[0, 0, 2, 3]], 3.0);

        let failing = MockEngine::failing(4);
        assert!(matches!(
            failing.infer(input.view()),
            Err(PrivacutError::InferenceFailed { .. })
        ));
        assert_eq!(failing.calls(), 1);
    }
}
