use crate::error::PreprocessError;
use image::{GrayImage, Luma};

/// Parameters for non-local means denoising
#[derive(Debug, Clone, Copy)]
pub struct NlMeansParams {
    /// Filter strength; larger values remove more noise and more detail
    pub h: f32,
    /// Side of the square patch compared between pixels (odd)
    pub template_window: u32,
    /// Side of the square area searched for similar patches (odd)
    pub search_window: u32,
}

/// Parameters for the edge-preserving bilateral filter
#[derive(Debug, Clone, Copy)]
pub struct BilateralParams {
    /// Neighbourhood diameter in pixels
    pub diameter: u32,
    pub sigma_color: f32,
    pub sigma_space: f32,
}

/// Weights below this are treated as zero
const NL_WEIGHT_CUTOFF: f32 = 0.001;

/// Non-local means denoising for a single-channel image.
///
/// Every pixel becomes a weighted mean of the pixels in its search window, where
/// the weight falls off with the mean squared difference between the two
/// surrounding patches: `w = exp(-d² / h²)`. Patch distances are accumulated one
/// displacement at a time with running box sums, so the cost is
/// O(pixels × search_window²) regardless of the template size.
pub fn non_local_means(
    img: &GrayImage,
    params: &NlMeansParams,
) -> Result<GrayImage, PreprocessError> {
    validate_window("nl_means", params.template_window)?;
    validate_window("nl_means", params.search_window)?;
    if params.h <= 0.0 {
        return Err(PreprocessError::transform("nl_means", "strength must be positive"));
    }

    let (width, height) = img.dimensions();
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 {
        return Ok(img.clone());
    }

    let src = img.as_raw();
    let template_radius = (params.template_window / 2) as i64;
    let search_radius = (params.search_window / 2) as i64;
    let template_area = (params.template_window * params.template_window) as u64;

    // Weight per mean squared patch distance (0..=255²)
    let h2 = params.h * params.h;
    let weight_lut: Vec<f32> = (0..=255u32 * 255)
        .map(|d| {
            let w = (-(d as f32) / h2).exp();
            if w < NL_WEIGHT_CUTOFF {
                0.0
            } else {
                w
            }
        })
        .collect();

    let mut weight_sum = vec![0.0f32; w * h];
    let mut value_sum = vec![0.0f32; w * h];
    let mut diff = vec![0u32; w * h];
    let mut row_pass = vec![0u32; w * h];
    let mut patch = vec![0u32; w * h];

    for dy in -search_radius..=search_radius {
        for dx in -search_radius..=search_radius {
            for y in 0..h {
                let sy = clamp_index(y as i64 + dy, h);
                for x in 0..w {
                    let sx = clamp_index(x as i64 + dx, w);
                    let d = src[y * w + x] as i32 - src[sy * w + sx] as i32;
                    diff[y * w + x] = (d * d) as u32;
                }
            }

            box_sum_rows(&diff, &mut row_pass, w, h, template_radius);
            box_sum_cols(&row_pass, &mut patch, w, h, template_radius);

            for y in 0..h {
                let sy = clamp_index(y as i64 + dy, h);
                for x in 0..w {
                    let idx = y * w + x;
                    let sx = clamp_index(x as i64 + dx, w);
                    let dist = (patch[idx] as u64 / template_area) as usize;
                    let weight = weight_lut[dist.min(weight_lut.len() - 1)];
                    weight_sum[idx] += weight;
                    value_sum[idx] += weight * src[sy * w + sx] as f32;
                }
            }
        }
    }

    // The zero displacement always contributes weight 1, so weight_sum > 0
    Ok(GrayImage::from_fn(width, height, |x, y| {
        let idx = y as usize * w + x as usize;
        let value = (value_sum[idx] / weight_sum[idx]).round();
        Luma([value.clamp(0.0, 255.0) as u8])
    }))
}

/// Bilateral filter: Gaussian in both distance and intensity difference, so
/// flat regions are smoothed while edges stay sharp. The neighbourhood is the
/// disc of the given diameter.
pub fn bilateral(
    img: &GrayImage,
    params: &BilateralParams,
) -> Result<GrayImage, PreprocessError> {
    if params.diameter == 0 || params.sigma_color <= 0.0 || params.sigma_space <= 0.0 {
        return Err(PreprocessError::transform(
            "bilateral",
            "diameter and sigmas must be positive",
        ));
    }

    let (width, height) = img.dimensions();
    let radius = (params.diameter / 2) as i64;

    let color_coeff = -0.5 / (params.sigma_color * params.sigma_color);
    let space_coeff = -0.5 / (params.sigma_space * params.sigma_space);

    let color_lut: Vec<f32> = (0..256)
        .map(|d| (color_coeff * (d * d) as f32).exp())
        .collect();

    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2.sqrt() > radius as f32 {
                continue;
            }
            offsets.push((dx, dy, (space_coeff * r2).exp()));
        }
    }

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let center = img.get_pixel(x, y).0[0];
        let mut sum = 0.0f32;
        let mut weight_sum = 0.0f32;

        for &(dx, dy, space_weight) in &offsets {
            let nx = clamp_index(x as i64 + dx, width as usize) as u32;
            let ny = clamp_index(y as i64 + dy, height as usize) as u32;
            let value = img.get_pixel(nx, ny).0[0];
            let weight = space_weight * color_lut[center.abs_diff(value) as usize];
            sum += weight * value as f32;
            weight_sum += weight;
        }

        Luma([(sum / weight_sum).round().clamp(0.0, 255.0) as u8])
    }))
}

fn validate_window(stage: &'static str, size: u32) -> Result<(), PreprocessError> {
    if size == 0 || size % 2 == 0 {
        return Err(PreprocessError::transform(
            stage,
            format!("window size must be odd and positive, got {}", size),
        ));
    }
    Ok(())
}

fn clamp_index(i: i64, len: usize) -> usize {
    i.clamp(0, len as i64 - 1) as usize
}

/// Horizontal running box sum with edge replication
fn box_sum_rows(src: &[u32], dst: &mut [u32], w: usize, h: usize, radius: i64) {
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        let mut sum: u32 = (-radius..=radius).map(|k| row[clamp_index(k, w)]).sum();
        for x in 0..w {
            dst[y * w + x] = sum;
            let add = row[clamp_index(x as i64 + radius + 1, w)];
            let sub = row[clamp_index(x as i64 - radius, w)];
            sum = sum + add - sub;
        }
    }
}

/// Vertical running box sum with edge replication
fn box_sum_cols(src: &[u32], dst: &mut [u32], w: usize, h: usize, radius: i64) {
    for x in 0..w {
        let mut sum: u32 = (-radius..=radius).map(|k| src[clamp_index(k, h) * w + x]).sum();
        for y in 0..h {
            dst[y * w + x] = sum;
            let add = src[clamp_index(y as i64 + radius + 1, h) * w + x];
            let sub = src[clamp_index(y as i64 - radius, h) * w + x];
            sum = sum + add - sub;
        }
    }
}
