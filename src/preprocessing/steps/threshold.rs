use crate::error::PreprocessError;
use image::{imageops, GrayImage, Luma};
use imageproc::filter::separable_filter_equal;

use super::statistics;

/// Parameters for Gaussian-weighted adaptive thresholding
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveThresholdParams {
    /// Side of the neighbourhood used for the local mean (odd, >= 3)
    pub block_size: u32,
    /// Subtracted from the local mean before comparing
    pub offset: f32,
    /// Value written for pixels above the threshold
    pub max_value: u8,
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel becomes `max_value` when it is brighter than
/// `weighted_mean(block) - offset`, else 0. The Gaussian spans the whole block
/// with sigma derived from the block size, so text strokes darker than their
/// surroundings go black while uneven backgrounds go white.
pub fn adaptive_gaussian(
    image: &GrayImage,
    params: &AdaptiveThresholdParams,
) -> Result<GrayImage, PreprocessError> {
    if params.block_size < 3 || params.block_size % 2 == 0 {
        return Err(PreprocessError::transform(
            "adaptive_threshold",
            format!("block size must be odd and >= 3, got {}", params.block_size),
        ));
    }

    let kernel = gaussian_kernel(params.block_size as usize);
    let local_mean = separable_filter_equal(image, &kernel);

    Ok(GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let value = image.get_pixel(x, y).0[0] as f32;
        let threshold = local_mean.get_pixel(x, y).0[0] as f32 - params.offset;
        if value > threshold {
            Luma([params.max_value])
        } else {
            Luma([0u8])
        }
    }))
}

/// Invert the image when its mean is below `mean_threshold`.
///
/// After binarization a mostly-dark page means the polarity flipped (light text
/// on dark ground), so it is flipped back. Returns whether it inverted.
pub fn invert_if_dark(mut image: GrayImage, mean_threshold: f64) -> (GrayImage, bool) {
    if statistics::mean(&image) < mean_threshold {
        imageops::invert(&mut image);
        (image, true)
    } else {
        (image, false)
    }
}

/// Normalized 1-D Gaussian of the given odd size.
/// Sigma follows the usual size-derived rule `0.3 × ((size - 1) / 2 - 1) + 0.8`.
fn gaussian_kernel(size: usize) -> Vec<f32> {
    let sigma = 0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let center = (size / 2) as f32;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let d = i as f32 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}
