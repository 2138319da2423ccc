use image::{DynamicImage, GrayImage, Luma, RgbImage};

/// BT.601 luma weights for R, G, B
const LUMA_WEIGHTS: [f32; 3] = [0.299, 0.587, 0.114];

/// Collapse the decoded image to a single BT.601 luma channel
pub fn to_gray(image: &DynamicImage) -> GrayImage {
    if let DynamicImage::ImageLuma8(gray) = image {
        return gray.clone();
    }

    let rgb = image.to_rgb8();
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let luma = r as f32 * LUMA_WEIGHTS[0]
            + g as f32 * LUMA_WEIGHTS[1]
            + b as f32 * LUMA_WEIGHTS[2];
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Replicate a single channel into RGB so every preset emits the same layout
pub fn to_rgb(gray: GrayImage) -> RgbImage {
    DynamicImage::ImageLuma8(gray).to_rgb8()
}
