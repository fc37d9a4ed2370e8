use image::{ImageBuffer, Luma, Pixel, Primitive, Rgb, Rgba};

use crate::errors::{PrivacutError, Result};

/// Attach a single-channel mask as the alpha channel of an RGB image.
///
/// Color channels are copied unchanged and the mask value becomes the alpha value
/// as-is, so the mask must already be expressed in the image's subpixel range.
pub trait ApplyAlphaMask<S>
where
    Rgba<S>: Pixel<Subpixel = S>,
    Luma<S>: Pixel<Subpixel = S>,
    S: Primitive + 'static,
{
    fn apply_alpha_mask(
        &self,
        mask: &ImageBuffer<Luma<S>, Vec<S>>,
    ) -> Result<ImageBuffer<Rgba<S>, Vec<S>>>;
}

impl<S> ApplyAlphaMask<S> for ImageBuffer<Rgb<S>, Vec<S>>
where
    Rgb<S>: Pixel<Subpixel = S>,
    Rgba<S>: Pixel<Subpixel = S>,
    Luma<S>: Pixel<Subpixel = S>,
    S: Primitive + 'static,
{
    fn apply_alpha_mask(
        &self,
        mask: &ImageBuffer<Luma<S>, Vec<S>>,
    ) -> Result<ImageBuffer<Rgba<S>, Vec<S>>> {
        // checked before anything is allocated
        if self.dimensions() != mask.dimensions() {
            return Err(PrivacutError::DimensionMismatch {
                expected: self.dimensions(),
                actual: mask.dimensions(),
            });
        }

        let pixels = self
            .pixels()
            .zip(mask.pixels())
            .flat_map(|(&Rgb([red, green, blue]), &Luma([alpha]))| [red, green, blue, alpha])
            .collect::<Vec<S>>();

        ImageBuffer::from_raw(self.width(), self.height(), pixels).ok_or_else(|| {
            PrivacutError::invalid_input("composited buffer does not match image dimensions")
        })
    }
}
