use crate::error::PreprocessError;
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Outcome of the resize guard, kept for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAction {
    Downscaled,
    Upscaled,
    Unchanged,
}

/// Normalize resolution for OCR.
///
/// Images wider than `max_width` are scaled down to exactly `max_width`. Images
/// that still fit within `max_width` after multiplying by `upscale_factor` are
/// enlarged by that factor. Anything in between is left alone. Both directions
/// keep the aspect ratio and use Lanczos resampling.
pub fn apply(
    image: DynamicImage,
    max_width: u32,
    upscale_factor: f32,
) -> Result<(DynamicImage, ResizeAction), PreprocessError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessError::EmptyImage);
    }

    match target_dimensions(width, height, max_width, upscale_factor) {
        Some((new_width, new_height, action)) => Ok((
            image.resize_exact(new_width, new_height, FilterType::Lanczos3),
            action,
        )),
        None => Ok((image, ResizeAction::Unchanged)),
    }
}

/// Compute the output size, or `None` when the image keeps its size
pub fn target_dimensions(
    width: u32,
    height: u32,
    max_width: u32,
    upscale_factor: f32,
) -> Option<(u32, u32, ResizeAction)> {
    if width > max_width {
        let scale = max_width as f64 / width as f64;
        let new_height = ((height as f64 * scale).round() as u32).max(1);
        return Some((max_width, new_height, ResizeAction::Downscaled));
    }

    let factor = upscale_factor as f64;
    if factor > 1.0 && width as f64 * factor <= max_width as f64 {
        let new_width = ((width as f64 * factor).round() as u32).max(1);
        let new_height = ((height as f64 * factor).round() as u32).max(1);
        return Some((new_width, new_height, ResizeAction::Upscaled));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_resize_upscales_small_image() {
        let img = GrayImage::new(100, 60);
        let (result, action) = apply(DynamicImage::ImageLuma8(img), 2000, 1.5).unwrap();
        assert_eq!(action, ResizeAction::Upscaled);
        assert_eq!(result.width(), 150);
        assert_eq!(result.height(), 90);
    }

    #[test]
    fn test_resize_rounds_odd_widths() {
        // 101 * 1.5 = 151.5
        let (w, h, _) = target_dimensions(101, 51, 2000, 1.5).unwrap();
        assert_eq!(w, 152);
        assert_eq!(h, 77);
    }

    #[test]
    fn test_resize_limits_wide_image() {
        let img = GrayImage::new(3000, 1500);
        let (result, action) = apply(DynamicImage::ImageLuma8(img), 2000, 1.5).unwrap();
        assert_eq!(action, ResizeAction::Downscaled);
        assert_eq!(result.width(), 2000);
        assert_eq!(result.height(), 1000);
    }

    #[test]
    fn test_resize_keeps_mid_range_width() {
        // 1500 * 1.5 > 2000 but 1500 <= 2000
        assert_eq!(target_dimensions(1500, 800, 2000, 1.5), None);
        assert_eq!(target_dimensions(2000, 800, 2000, 1.5), None);
    }

    #[test]
    fn test_resize_upscale_boundary_is_inclusive() {
        // 1333 * 1.5 = 1999.5, 1334 * 1.5 = 2001
        assert!(target_dimensions(1333, 100, 2000, 1.5).is_some());
        assert!(target_dimensions(1334, 100, 2000, 1.5).is_none());
    }

    #[test]
    fn test_resize_never_collapses_height() {
        let (w, h, _) = target_dimensions(10_000, 1, 2000, 1.5).unwrap();
        assert_eq!(w, 2000);
        assert_eq!(h, 1);
    }
}
