use crate::error::PreprocessError;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::{filter3x3, gaussian_blur_f32};

/// Centre 9, all eight neighbours -1: the identity plus a full Laplacian
const SHARPEN_KERNEL: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// Apply the fixed 3x3 sharpening kernel, saturating to 0..=255
pub fn kernel_sharpen(image: &GrayImage) -> GrayImage {
    filter3x3(image, &SHARPEN_KERNEL)
}

/// Per-pixel `a × alpha + b × beta + gamma`, rounded and saturated
pub fn blend(
    a: &GrayImage,
    alpha: f32,
    b: &GrayImage,
    beta: f32,
    gamma: f32,
) -> Result<GrayImage, PreprocessError> {
    if a.dimensions() != b.dimensions() {
        return Err(PreprocessError::transform(
            "blend",
            format!("size mismatch {:?} vs {:?}", a.dimensions(), b.dimensions()),
        ));
    }

    Ok(GrayImage::from_fn(a.width(), a.height(), |x, y| {
        let va = a.get_pixel(x, y).0[0] as f32;
        let vb = b.get_pixel(x, y).0[0] as f32;
        Luma([saturate(va * alpha + vb * beta + gamma)])
    }))
}

/// Unsharp mask on a colour image: `image × amount + blur(image) × (1 - amount)`.
///
/// With `amount` 1.7 this is `1.7 × image - 0.7 × blurred`, which amplifies
/// everything the Gaussian removed.
pub fn unsharp_mask(
    image: &RgbImage,
    sigma: f32,
    amount: f32,
) -> Result<RgbImage, PreprocessError> {
    if sigma <= 0.0 {
        return Err(PreprocessError::transform("unsharp_mask", "sigma must be positive"));
    }

    let blurred = gaussian_blur_f32(image, sigma);
    let keep = 1.0 - amount;

    Ok(RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let src = image.get_pixel(x, y).0;
        let blur = blurred.get_pixel(x, y).0;
        Rgb([
            saturate(src[0] as f32 * amount + blur[0] as f32 * keep),
            saturate(src[1] as f32 * amount + blur[1] as f32 * keep),
            saturate(src[2] as f32 * amount + blur[2] as f32 * keep),
        ])
    }))
}

fn saturate(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
