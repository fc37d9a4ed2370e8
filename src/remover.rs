use image::{DynamicImage, RgbImage, RgbaImage};
use ndarray::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::{
    errors::{PrivacutError, Result},
    pipeline::{composite, postprocess, preprocess},
    traits::InferenceEngine,
};

/// Result of a best-effort background removal.
#[derive(Debug)]
pub struct Removal {
    /// RGBA foreground on success, the untouched RGB input on failure.
    pub image: DynamicImage,
    /// Why the original image was returned, for user-visible notification.
    pub failure: Option<PrivacutError>,
}

impl Removal {
    pub const fn is_fallback(&self) -> bool {
        self.failure.is_some()
    }
}

/// Owns the inference session and drives the
/// `preprocess → infer → postprocess → composite` sequence.
///
/// A remover starts either empty (not ready) or with an engine. `infer` and every
/// removal call fail with [`PrivacutError::SessionNotReady`] until an engine is loaded.
pub struct BackgroundRemover<E: InferenceEngine> {
    engine: Option<E>,
}

impl<E: InferenceEngine> Default for BackgroundRemover<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: InferenceEngine> BackgroundRemover<E> {
    pub const fn new() -> Self {
        Self { engine: None }
    }

    pub const fn with_engine(engine: E) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub const fn is_ready(&self) -> bool {
        self.engine.is_some()
    }

    /// Load the engine with `loader` unless one is already loaded.
    ///
    /// A failed load leaves the remover not ready and hands the error back unchanged;
    /// retrying is up to the caller.
    pub fn initialize<F>(&mut self, loader: F) -> Result<()>
    where
        F: FnOnce() -> Result<E>,
    {
        if self.engine.is_some() {
            return Ok(());
        }
        match loader() {
            Ok(engine) => {
                tracing::info!("Background remover ready");
                self.engine = Some(engine);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to initialize background remover: {e}");
                Err(e)
            }
        }
    }

    /// Release the engine. Returns whether one was loaded.
    pub fn close(&mut self) -> bool {
        let released = self.engine.take().is_some();
        if released {
            tracing::info!("Background remover closed");
        }
        released
    }

    fn engine(&self) -> Result<&E> {
        self.engine.as_ref().ok_or(PrivacutError::SessionNotReady)
    }

    pub fn input_size(&self) -> Result<u32> {
        Ok(self.engine()?.input_size())
    }

    /// Run the model on a `[1, 3, S, S]` tensor matching the engine's input size.
    pub fn infer(&self, tensor: ArrayView4<f32>) -> Result<ArrayD<f32>> {
        let engine = self.engine()?;
        let side = engine.input_size() as usize;
        if tensor.shape() != [1, 3, side, side] {
            return Err(PrivacutError::inference(
                "input validation",
                format!(
                    "expected tensor shape [1, 3, {side}, {side}], got {:?}",
                    tensor.shape()
                ),
            ));
        }

        let _span = tracing::debug_span!("inference").entered();
        engine.infer(tensor)
    }

    pub fn remove_background(&self, image: &RgbImage) -> Result<RgbaImage> {
        self.run_stages(image, None)
    }

    /// Like [`Self::remove_background`], checking `token` before each stage. A stage
    /// that has already started always runs to completion.
    pub fn remove_background_cancellable(
        &self,
        image: &RgbImage,
        token: &CancellationToken,
    ) -> Result<RgbaImage> {
        self.run_stages(image, Some(token))
    }

    /// Background removal that never loses the user's image: any failure yields the
    /// original pixels together with the error.
    pub fn remove_background_or_original(&self, image: &RgbImage) -> Removal {
        match self.remove_background(image) {
            Ok(rgba) => Removal {
                image: DynamicImage::ImageRgba8(rgba),
                failure: None,
            },
            Err(e) => {
                // callers report the failure with their own context
                tracing::debug!(
                    recoverable = e.is_recoverable_by_fallback(),
                    "Background removal failed, keeping original image: {e}"
                );
                Removal {
                    image: DynamicImage::ImageRgb8(image.clone()),
                    failure: Some(e),
                }
            }
        }
    }

    fn run_stages(&self, image: &RgbImage, token: Option<&CancellationToken>) -> Result<RgbaImage> {
        let checkpoint = || match token {
            Some(token) if token.is_cancelled() => Err(PrivacutError::Cancelled),
            _ => Ok(()),
        };

        checkpoint()?;
        let input_size = self.input_size()?;
        let (width, height) = image.dimensions();
        let tensor = preprocess(image, input_size)?;

        checkpoint()?;
        let output = self.infer(tensor.view())?;

        checkpoint()?;
        let mask = postprocess(output.view(), input_size, width, height)?;

        checkpoint()?;
        composite(image, &mask)
    }
}
