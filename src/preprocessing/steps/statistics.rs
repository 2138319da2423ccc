use image::GrayImage;

/// Mean intensity over the whole image
pub fn mean(img: &GrayImage) -> f64 {
    let count = img.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = img.as_raw().iter().map(|&v| v as u64).sum();
    sum as f64 / count as f64
}

/// Population standard deviation of intensities
pub fn std_dev(img: &GrayImage) -> f64 {
    let count = img.as_raw().len();
    if count == 0 {
        return 0.0;
    }
    let mean = mean(img);
    let variance = img
        .as_raw()
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / count as f64;
    variance.sqrt()
}
