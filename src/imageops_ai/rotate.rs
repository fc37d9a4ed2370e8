use image::{imageops, GenericImageView, ImageBuffer, Pixel};

use crate::errors::{PrivacutError, Result};

/// Clockwise quarter-turn rotation applied to a photo before segmentation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    /// Parse a rotation in degrees. Values are normalised modulo 360 and must land on
    /// a quarter turn.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        match degrees.rem_euclid(360) {
            0 => Ok(Self::None),
            90 => Ok(Self::Clockwise90),
            180 => Ok(Self::Clockwise180),
            270 => Ok(Self::Clockwise270),
            _ => Err(PrivacutError::invalid_input(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            ))),
        }
    }

    pub const fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Clockwise90 => 90,
            Self::Clockwise180 => 180,
            Self::Clockwise270 => 270,
        }
    }

    /// Rotate into a newly allocated buffer; the source is left untouched.
    pub fn apply<I, P>(self, image: &I) -> ImageBuffer<P, Vec<P::Subpixel>>
    where
        I: GenericImageView<Pixel = P>,
        P: Pixel + 'static,
    {
        match self {
            Self::None => {
                let (width, height) = image.dimensions();
                ImageBuffer::from_fn(width, height, |x, y| image.get_pixel(x, y))
            }
            Self::Clockwise90 => imageops::rotate90(image),
            Self::Clockwise180 => imageops::rotate180(image),
            Self::Clockwise270 => imageops::rotate270(image),
        }
    }
}
