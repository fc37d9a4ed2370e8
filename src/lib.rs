//! Background removal for photos with a pre-trained segmentation model.
//!
//! The core is [`BackgroundRemover`], which owns an [`InferenceEngine`] and runs the
//! pure stages in [`pipeline`]. [`OrtEngine`] backs the engine with ONNX Runtime;
//! [`ImageProcessor`] applies the remover to files on disk.

pub mod asset;
pub mod config;
pub mod errors;
pub mod imageops_ai;
pub mod model;
pub mod pipeline;
pub mod processor;
pub mod remover;
pub mod traits;

pub mod mocks;

pub use asset::ModelLocator;
pub use config::Config;
pub use errors::{PrivacutError, Result};
pub use imageops_ai::Rotation;
pub use model::{EngineOptions, OrtEngine};
pub use pipeline::{composite, postprocess, preprocess, Mask, DEFAULT_INPUT_SIZE};
pub use processor::{ImageProcessor, ProcessSummary};
pub use remover::{BackgroundRemover, Removal};
pub use traits::*;

impl BackgroundRemover<OrtEngine> {
    /// Remover backed by the ONNX model the configuration points at.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut remover = Self::new();
        remover.initialize(|| {
            let model_path = config.resolve_model_path()?;
            OrtEngine::new(&model_path, &config.engine_options())
        })?;
        Ok(remover)
    }
}
