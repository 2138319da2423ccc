use crate::error::PreprocessError;
use image::{GrayImage, Luma};
use imageproc::contrast::equalize_histogram;

/// Parameters for contrast-limited adaptive histogram equalization
#[derive(Debug, Clone, Copy)]
pub struct ClaheParams {
    /// Histogram bins are clipped at `clip_limit × (tile area / 256)`
    pub clip_limit: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

const BINS: usize = 256;

/// Global histogram equalization
pub fn equalize(image: &GrayImage) -> GrayImage {
    equalize_histogram(image)
}

/// Contrast-limited adaptive histogram equalization (CLAHE).
///
/// The image is split into a `tiles_x × tiles_y` grid. Each tile gets its own
/// equalization lookup table built from a clipped histogram, with the clipped
/// excess spread evenly over all bins. Output pixels bilinearly interpolate the
/// lookup tables of the four nearest tile centres so tile seams do not show.
pub fn clahe(image: &GrayImage, params: &ClaheParams) -> Result<GrayImage, PreprocessError> {
    if params.tiles_x == 0 || params.tiles_y == 0 {
        return Err(PreprocessError::transform("clahe", "tile grid must be non-empty"));
    }
    if params.clip_limit <= 0.0 {
        return Err(PreprocessError::transform("clahe", "clip limit must be positive"));
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Ok(image.clone());
    }

    // Small images get fewer tiles rather than empty ones. The grid covers a
    // reflected extension of the image so every tile has the same area.
    let tiles_x = params.tiles_x.min(width);
    let tiles_y = params.tiles_y.min(height);
    let tile_w = width.div_ceil(tiles_x);
    let tile_h = height.div_ceil(tiles_y);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let tile = Tile {
                x0: tx * tile_w,
                y0: ty * tile_h,
                width: tile_w,
                height: tile_h,
            };
            luts.push(tile_lut(image, tile, params.clip_limit));
        }
    }

    let inv_tw = 1.0 / tile_w as f32;
    let inv_th = 1.0 / tile_h as f32;
    let last_tx = tiles_x as i64 - 1;
    let last_ty = tiles_y as i64 - 1;

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let value = image.get_pixel(x, y).0[0] as usize;

        let txf = x as f32 * inv_tw - 0.5;
        let tx1 = txf.floor() as i64;
        let xa = txf - tx1 as f32;
        let tx2 = (tx1 + 1).min(last_tx) as usize;
        let tx1 = tx1.max(0) as usize;

        let tyf = y as f32 * inv_th - 0.5;
        let ty1 = tyf.floor() as i64;
        let ya = tyf - ty1 as f32;
        let ty2 = (ty1 + 1).min(last_ty) as usize;
        let ty1 = ty1.max(0) as usize;

        let lut = |tx: usize, ty: usize| luts[ty * tiles_x as usize + tx][value] as f32;

        let top = lut(tx1, ty1) * (1.0 - xa) + lut(tx2, ty1) * xa;
        let bottom = lut(tx1, ty2) * (1.0 - xa) + lut(tx2, ty2) * xa;
        let out = top * (1.0 - ya) + bottom * ya;

        Luma([out.round().clamp(0.0, 255.0) as u8])
    }))
}

#[derive(Debug, Clone, Copy)]
struct Tile {
    x0: u32,
    y0: u32,
    width: u32,
    height: u32,
}

/// Mirror an index past the end back into `0..len`, excluding the edge pixel
fn reflect_101(i: u32, len: u32) -> u32 {
    if len == 1 || i < len {
        i.min(len - 1)
    } else {
        (2 * (len - 1)).saturating_sub(i)
    }
}

/// Clipped-histogram equalization table for one tile
fn tile_lut(image: &GrayImage, tile: Tile, clip_limit: f32) -> [u8; BINS] {
    let (width, height) = image.dimensions();
    let mut hist = [0u32; BINS];
    for y in tile.y0..tile.y0 + tile.height {
        let sy = reflect_101(y, height);
        for x in tile.x0..tile.x0 + tile.width {
            let sx = reflect_101(x, width);
            hist[image.get_pixel(sx, sy).0[0] as usize] += 1;
        }
    }

    let area = tile.width * tile.height;
    let limit = ((clip_limit * area as f32 / BINS as f32) as u32).max(1);

    let mut clipped = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            clipped += *bin - limit;
            *bin = limit;
        }
    }

    let batch = clipped / BINS as u32;
    let residual = (clipped - batch * BINS as u32) as usize;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (BINS / residual).max(1);
        for i in (0..BINS).step_by(step).take(residual) {
            hist[i] += 1;
        }
    }

    let scale = (BINS - 1) as f32 / area as f32;
    let mut lut = [0u8; BINS];
    let mut sum = 0u32;
    for (i, count) in hist.iter().enumerate() {
        sum += count;
        lut[i] = (sum as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}
