use crate::error::PreprocessError;
use base64::Engine;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder, RgbImage};

/// Encode as PNG with zlib compression switched off
pub fn to_png(image: &RgbImage) -> Result<Vec<u8>, PreprocessError> {
    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        &mut buffer,
        CompressionType::Uncompressed,
        FilterType::NoFilter,
    );
    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .map_err(PreprocessError::Encode)?;
    Ok(buffer)
}

/// Standard padded base64 for JSON transport
pub fn to_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}
