//! Pure image ⇄ tensor transformations around the segmentation model.
//!
//! `preprocess` → engine → `postprocess` → `composite`. None of these functions keep
//! state or touch their inputs; every stage returns a freshly allocated value.

use std::borrow::Cow;

use image::{imageops, imageops::FilterType, GrayImage, Luma, RgbImage, RgbaImage};
use ndarray::prelude::*;
use nshare::AsNdarray3;

use crate::{
    errors::{PrivacutError, Result},
    imageops_ai::ApplyAlphaMask,
};

/// Input side of the reference model (RMBG-1.4).
pub const DEFAULT_INPUT_SIZE: u32 = 1024;

/// Per-channel normalization used when the model was trained. Not ImageNet statistics.
pub const MEAN: [f32; 3] = [0.5, 0.5, 0.5];
pub const STD: [f32; 3] = [1.0, 1.0, 1.0];

/// Per-pixel foreground opacity at the original image's resolution.
pub type Mask = GrayImage;

/// Resize `image` to `input_size`×`input_size` and normalize it into a `[1, 3, S, S]`
/// channel-first tensor (R, G, B planes).
///
/// The aspect ratio is not preserved; the image is always stretched to a square.
pub fn preprocess(image: &RgbImage, input_size: u32) -> Result<Array4<f32>> {
    let _span = tracing::debug_span!("preprocess").entered();

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PrivacutError::invalid_input(format!(
            "image must have positive dimensions, got {width}x{height}"
        )));
    }
    if input_size == 0 {
        return Err(PrivacutError::invalid_input("model input size must be positive"));
    }

    let resized = if (width, height) == (input_size, input_size) {
        Cow::Borrowed(image)
    } else {
        Cow::Owned(imageops::resize(
            image,
            input_size,
            input_size,
            FilterType::Triangle,
        ))
    };

    // (channel, height, width) view over the interleaved buffer
    let pixels = resized.as_ndarray3();
    let side = input_size as usize;

    Ok(Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
        (f32::from(pixels[[c, y, x]]) / 255.0 - MEAN[c]) / STD[c]
    }))
}

/// Turn the raw model output into an 8-bit mask of `width`×`height`.
///
/// The output is read as an S×S single-channel map regardless of its declared shape.
/// Values are min-max rescaled over the whole map, then sampled with nearest-neighbor
/// mapping (`floor(i * S / len)`, clamped to `S - 1`) on each axis independently.
/// A map without any spread (`max == min`) yields an all-zero mask.
pub fn postprocess(
    output: ArrayViewD<f32>,
    input_size: u32,
    width: u32,
    height: u32,
) -> Result<Mask> {
    let _span = tracing::debug_span!("postprocess", width, height).entered();

    if width == 0 || height == 0 {
        return Err(PrivacutError::invalid_input(format!(
            "mask must have positive dimensions, got {width}x{height}"
        )));
    }
    if input_size == 0 {
        return Err(PrivacutError::invalid_input("model input size must be positive"));
    }

    let side = input_size as usize;
    let values = output.as_standard_layout();
    let values = values
        .as_slice()
        .ok_or_else(|| PrivacutError::invalid_input("output tensor is not contiguous"))?;
    if values.len() != side * side {
        return Err(PrivacutError::invalid_input(format!(
            "output tensor of shape {:?} does not hold {side}x{side} values",
            output.shape()
        )));
    }

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), &v| {
            (min.min(v), max.max(v))
        });
    let range = max - min;
    tracing::debug!(min, max, "output range");

    // also catches an all-NaN map, where the range itself is NaN
    if !(range > 0.0) {
        return Ok(GrayImage::new(width, height));
    }

    let ratio_y = input_size as f32 / height as f32;
    let ratio_x = input_size as f32 / width as f32;
    let last = side - 1;

    Ok(GrayImage::from_fn(width, height, |w, h| {
        let y = ((h as f32 * ratio_y) as usize).min(last);
        let x = ((w as f32 * ratio_x) as usize).min(last);
        let value = values[y * side + x];
        let alpha = ((value - min) / range * 255.0).clamp(0.0, 255.0) as u8;
        Luma([alpha])
    }))
}

/// Copy `image` into a new RGBA buffer with `mask` as its alpha channel.
pub fn composite(image: &RgbImage, mask: &Mask) -> Result<RgbaImage> {
    let _span = tracing::debug_span!("composite").entered();
    image.apply_alpha_mask(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn assert_close(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_preprocess_shape_and_range() -> Result<()> {
        let image = RgbImage::from_fn(37, 19, |x, y| {
            Rgb([(x * 7) as u8, (y * 13) as u8, ((x + y) * 5) as u8])
        });

        let tensor = preprocess(&image, 16)?;

        assert_eq!(tensor.shape(), &[1, 3, 16, 16]);
        assert_eq!(tensor.len(), 3 * 16 * 16);
        assert!(tensor.iter().all(|v| (-0.5..=0.5).contains(v)));
        assert!(tensor.is_standard_layout());
        Ok(())
    }

    #[test]
    fn test_preprocess_channel_first_layout() -> Result<()> {
        // サイズが一致する場合はリサイズされず、値がそのまま配置される
        let image = RgbImage::from_fn(4, 4, |x, y| Rgb([x as u8, y as u8, 255]));

        let tensor = preprocess(&image, 4)?;
        let flat = tensor.as_slice().unwrap();

        for y in 0..4 {
            for x in 0..4 {
                assert_close(flat[y * 4 + x], x as f32 / 255.0 - 0.5);
                assert_close(flat[16 + y * 4 + x], y as f32 / 255.0 - 0.5);
                assert_close(flat[32 + y * 4 + x], 0.5);
            }
        }
        Ok(())
    }

    #[test]
    fn test_preprocess_uniform_gray_reference_size() -> Result<()> {
        let image = RgbImage::from_pixel(DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE, Rgb([128; 3]));

        let tensor = preprocess(&image, DEFAULT_INPUT_SIZE)?;

        let expected = (128.0 / 255.0 - 0.5) / 1.0;
        assert_eq!(tensor.len(), 3 * 1024 * 1024);
        assert!(tensor.iter().all(|&v| (v - expected).abs() < 1e-6));
        assert_close(expected, 0.001_960_8);
        Ok(())
    }

    #[test]
    fn test_preprocess_stretches_uniform_image() -> Result<()> {
        let image = RgbImage::from_pixel(30, 10, Rgb([0, 255, 51]));

        let tensor = preprocess(&image, 8)?;

        let tolerance = 1.5 / 255.0;
        let plane_near = |c: usize, expected: f32| {
            tensor
                .slice(s![0, c, .., ..])
                .iter()
                .all(|&v| (v - expected).abs() < tolerance)
        };
        assert!(plane_near(0, -0.5));
        assert!(plane_near(1, 0.5));
        assert!(plane_near(2, 0.2 - 0.5));
        Ok(())
    }

    #[test]
    fn test_preprocess_rejects_empty_image() {
        let image = RgbImage::new(0, 10);
        assert!(matches!(
            preprocess(&image, 8),
            Err(PrivacutError::InvalidInput { .. })
        ));

        let image = RgbImage::new(4, 4);
        assert!(matches!(
            preprocess(&image, 0),
            Err(PrivacutError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_postprocess_mask_length_follows_target() -> Result<()> {
        let output = Array4::from_shape_fn((1, 1, 8, 8), |(_, _, y, x)| (y * 8 + x) as f32);

        for (width, height) in [(8, 8), (3, 5), (20, 7), (1, 1)] {
            let mask = postprocess(output.view().into_dyn(), 8, width, height)?;
            assert_eq!(mask.dimensions(), (width, height));
            assert_eq!(mask.len(), (width * height) as usize);
        }
        Ok(())
    }

    #[test]
    fn test_postprocess_min_max_rescale() -> Result<()> {
        let output = Array4::from_shape_fn((1, 1, 2, 2), |(_, _, y, x)| match (y, x) {
            (0, 0) => -3.0,
            (0, 1) => -1.0,
            (1, 0) => 0.0,
            _ => 1.0,
        });

        let mask = postprocess(output.view().into_dyn(), 2, 2, 2)?;

        // (v - min) / (max - min) * 255, truncated
        assert_eq!(mask.as_raw(), &vec![0, 127, 191, 255]);
        Ok(())
    }

    #[test]
    fn test_postprocess_uniform_output_is_zero() -> Result<()> {
        let output = Array4::<f32>::from_elem((1, 1, 4, 4), 0.7);

        let mask = postprocess(output.view().into_dyn(), 4, 6, 3)?;

        assert_eq!(mask.dimensions(), (6, 3));
        assert!(mask.pixels().all(|p| p.0 == [0]));
        Ok(())
    }

    #[test]
    fn test_postprocess_downscale_tie_behavior() -> Result<()> {
        // 2048x1024 の元画像に対して rx = 0.5
        let side = DEFAULT_INPUT_SIZE as usize;
        let output = Array4::from_shape_fn((1, 1, side, side), |(_, _, _, x)| x as f32);

        let mask = postprocess(output.view().into_dyn(), DEFAULT_INPUT_SIZE, 2048, 1024)?;

        assert_eq!(mask.dimensions(), (2048, 1024));
        assert_eq!(mask.get_pixel(0, 0), mask.get_pixel(1, 0));
        assert_eq!(mask.get_pixel(0, 0).0, [0]);
        assert_eq!(mask.get_pixel(2, 0).0, mask.get_pixel(3, 0).0);
        assert_eq!(mask.get_pixel(2047, 1023).0, [255]);
        Ok(())
    }

    #[test]
    fn test_postprocess_upscale_repeats_source() -> Result<()> {
        let output = Array4::from_shape_fn((1, 1, 2, 2), |(_, _, y, x)| (y * 2 + x) as f32);

        let mask = postprocess(output.view().into_dyn(), 2, 4, 4)?;

        let expected: Vec<u8> = vec![
            0, 0, 85, 85, //
            0, 0, 85, 85, //
            170, 170, 255, 255, //
            170, 170, 255, 255,
        ];
        assert_eq!(mask.as_raw(), &expected);
        Ok(())
    }

    #[test]
    fn test_postprocess_accepts_any_shape_with_matching_length() -> Result<()> {
        let output = Array2::from_shape_fn((4, 4), |(y, x)| (y + x) as f32);
        let mask = postprocess(output.view().into_dyn(), 4, 4, 4)?;
        assert_eq!(mask.get_pixel(3, 3).0, [255]);

        let wrong = Array4::<f32>::zeros((1, 2, 4, 4));
        assert!(matches!(
            postprocess(wrong.view().into_dyn(), 4, 4, 4),
            Err(PrivacutError::InvalidInput { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_postprocess_rejects_empty_target() {
        let output = Array4::<f32>::zeros((1, 1, 2, 2));
        assert!(matches!(
            postprocess(output.view().into_dyn(), 2, 0, 2),
            Err(PrivacutError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_composite_keeps_rgb_and_sets_alpha() -> Result<()> {
        let image = RgbImage::from_fn(2, 2, |x, y| Rgb([10 + x as u8, 20 + y as u8, 30]));
        let mask = GrayImage::from_raw(2, 2, vec![0, 255, 128, 0]).unwrap();

        let rgba = composite(&image, &mask)?;

        assert_eq!(rgba.get_pixel(0, 0).0, [10, 20, 30, 0]);
        assert_eq!(rgba.get_pixel(1, 0).0, [11, 20, 30, 255]);
        assert_eq!(rgba.get_pixel(0, 1).0, [10, 21, 30, 128]);
        assert_eq!(rgba.get_pixel(1, 1).0, [11, 21, 30, 0]);
        Ok(())
    }

    #[test]
    fn test_composite_dimension_mismatch() {
        let image = RgbImage::new(3, 3);
        let mask = GrayImage::new(3, 2);

        assert!(matches!(
            composite(&image, &mask),
            Err(PrivacutError::DimensionMismatch {
                expected: (3, 3),
                actual: (3, 2)
            })
        ));
    }
}
