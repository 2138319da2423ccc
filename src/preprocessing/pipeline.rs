use crate::error::PreprocessError;
use image::{GrayImage, RgbImage};
use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use super::steps;
use super::steps::contrast::ClaheParams;
use super::steps::denoise::{BilateralParams, NlMeansParams};
use super::steps::resize::ResizeAction;
use super::steps::threshold::AdaptiveThresholdParams;

const HANDWRITING_NL_MEANS: NlMeansParams = NlMeansParams {
    h: 10.0,
    template_window: 7,
    search_window: 21,
};
const HANDWRITING_CLAHE: ClaheParams = ClaheParams {
    clip_limit: 2.0,
    tiles_x: 8,
    tiles_y: 8,
};

const LOW_CONTRAST_CLAHE: ClaheParams = ClaheParams {
    clip_limit: 3.5,
    tiles_x: 12,
    tiles_y: 12,
};
const LOW_CONTRAST_THRESHOLD: AdaptiveThresholdParams = AdaptiveThresholdParams {
    block_size: 21,
    offset: 10.0,
    max_value: 255,
};

const TEXT_BILATERAL: BilateralParams = BilateralParams {
    diameter: 9,
    sigma_color: 35.0,
    sigma_space: 35.0,
};
const TEXT_CLAHE: ClaheParams = ClaheParams {
    clip_limit: 2.8,
    tiles_x: 12,
    tiles_y: 12,
};
/// Weights of the CLAHE output and its sharpened copy in the text chain
const TEXT_BLEND: (f32, f32) = (0.3, 0.7);

/// Final unsharp mask: Gaussian sigma and the weight kept on the original
const UNSHARP_SIGMA: f32 = 2.0;
const UNSHARP_AMOUNT: f32 = 1.7;

/// Requested preprocessing preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Printed text: bilateral denoise, CLAHE, blended sharpening
    Text,
    /// Handwriting: non-local means denoise, gentle CLAHE, sharpening
    Handwriting,
    /// Faded scans: equalization, strong CLAHE, adaptive binarization
    LowContrast,
    /// Pick `Text` or `LowContrast` from the image's contrast
    #[default]
    Auto,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::Text,
        Preset::Handwriting,
        Preset::LowContrast,
        Preset::Auto,
    ];

    /// Get the preset name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Handwriting => "handwriting",
            Self::LowContrast => "low_contrast",
            Self::Auto => "auto",
        }
    }

    /// Parse a query value, falling back to `Text` for anything unrecognized
    pub fn parse_or_text(s: &str) -> Self {
        s.parse().unwrap_or_else(|e: PreprocessError| {
            tracing::warn!(kind = e.kind(), "{}, falling back to text", e);
            Self::Text
        })
    }
}

impl FromStr for Preset {
    type Err = PreprocessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "handwriting" => Ok(Self::Handwriting),
            "low_contrast" => Ok(Self::LowContrast),
            "auto" => Ok(Self::Auto),
            _ => Err(PreprocessError::UnsupportedPreset(s.to_string())),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A preset with `Auto` already decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedPreset {
    Text,
    Handwriting,
    LowContrast,
}

impl ResolvedPreset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Handwriting => "handwriting",
            Self::LowContrast => "low_contrast",
        }
    }
}

impl fmt::Display for ResolvedPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunable thresholds of the pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    /// Wider images are scaled down to this width
    pub max_width: u32,
    /// Narrow images are scaled up by this factor when the result fits `max_width`
    pub upscale_factor: f32,
    /// `Auto` picks `LowContrast` when the grayscale stddev is below this
    pub auto_stddev_threshold: f64,
    /// Thresholded low-contrast output with a mean below this gets inverted
    pub invert_mean_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_width: 2000,
            upscale_factor: 1.5,
            auto_stddev_threshold: 40.0,
            invert_mean_threshold: 127.0,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), PreprocessError> {
        if self.max_width == 0 {
            return Err(PreprocessError::InvalidConfig(
                "max width must be positive".to_string(),
            ));
        }
        if !self.upscale_factor.is_finite() || self.upscale_factor < 1.0 {
            return Err(PreprocessError::InvalidConfig(format!(
                "upscale factor must be >= 1.0, got {}",
                self.upscale_factor
            )));
        }
        if !(0.0..=255.0).contains(&self.invert_mean_threshold) {
            return Err(PreprocessError::InvalidConfig(format!(
                "invert mean threshold must be within 0..=255, got {}",
                self.invert_mean_threshold
            )));
        }
        if !self.auto_stddev_threshold.is_finite() || self.auto_stddev_threshold < 0.0 {
            return Err(PreprocessError::InvalidConfig(format!(
                "auto stddev threshold must be non-negative, got {}",
                self.auto_stddev_threshold
            )));
        }
        Ok(())
    }
}

/// Timing information for a single preprocessing step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of preprocessing including timing stats
#[derive(Debug, Clone, Serialize)]
pub struct PreprocessingResult {
    /// Final 3-channel image (not serialized)
    #[serde(skip)]
    pub image: RgbImage,
    /// Base64 of the PNG encoding of `image`
    #[serde(skip)]
    pub encoded: String,
    /// Preset the chain actually ran with
    pub preset: ResolvedPreset,
    /// Total preprocessing time in milliseconds
    pub total_time_ms: u64,
    /// Individual step timings
    pub steps: Vec<StepTiming>,
}

/// Preprocessing pipeline: decode, normalize size, run a preset chain, sharpen, encode
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the whole pipeline over encoded image bytes.
    ///
    /// Any failing stage aborts the call; there is no partial output.
    pub fn process(
        &self,
        bytes: &[u8],
        preset: Preset,
    ) -> Result<PreprocessingResult, PreprocessError> {
        let start = Instant::now();
        let mut timings = Vec::new();

        tracing::info!("Processing image of size: {} bytes", bytes.len());

        let decoded = self.run_step("decode", &mut timings, || {
            image::load_from_memory(bytes).map_err(PreprocessError::Decode)
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(PreprocessError::EmptyImage);
        }
        tracing::info!(
            width = decoded.width(),
            height = decoded.height(),
            color = ?decoded.color(),
            "Image decoded"
        );

        let (resized, action) = self.run_step("resize", &mut timings, || {
            steps::resize::apply(decoded, self.config.max_width, self.config.upscale_factor)
        })?;
        match action {
            ResizeAction::Unchanged => tracing::info!(
                "Image kept at original size {}x{}",
                resized.width(),
                resized.height()
            ),
            _ => tracing::info!(
                "Image {:?} to {}x{}",
                action,
                resized.width(),
                resized.height()
            ),
        }

        let gray = self.run_step("grayscale", &mut timings, || {
            Ok(steps::grayscale::to_gray(&resized))
        })?;
        drop(resized);

        let resolved = self.resolve_preset(preset, &gray);
        let processed = self.apply(resolved, gray, &mut timings)?;

        let color = self.run_step("to_rgb", &mut timings, || {
            Ok(steps::grayscale::to_rgb(processed))
        })?;
        let image = self.run_step("unsharp_mask", &mut timings, || {
            steps::sharpen::unsharp_mask(&color, UNSHARP_SIGMA, UNSHARP_AMOUNT)
        })?;
        let encoded = self.run_step("encode", &mut timings, || {
            steps::encode::to_png(&image).map(|png| steps::encode::to_base64(&png))
        })?;

        let total_time_ms = start.elapsed().as_millis() as u64;
        for timing in &timings {
            tracing::debug!(step = %timing.name, time_ms = timing.time_ms, "Step finished");
        }
        tracing::info!(
            "Image processed with preset '{}' in {}ms, encoded to PNG and base64",
            resolved,
            total_time_ms
        );

        Ok(PreprocessingResult {
            image,
            encoded,
            preset: resolved,
            total_time_ms,
            steps: timings,
        })
    }

    /// Boundary form of [`Pipeline::process`]: failures are logged with their
    /// kind and source chain and collapse to `None`.
    pub fn process_logged(&self, bytes: &[u8], preset: Preset) -> Option<PreprocessingResult> {
        match self.process(bytes, preset) {
            Ok(result) => Some(result),
            Err(e) => {
                let mut chain = Vec::new();
                let mut source = e.source();
                while let Some(cause) = source {
                    chain.push(cause.to_string());
                    source = cause.source();
                }
                tracing::error!(
                    kind = e.kind(),
                    causes = ?chain,
                    "Error during image processing: {}",
                    e
                );
                None
            }
        }
    }

    /// Decide which chain a request runs. `Auto` measures the grayscale
    /// spread; anything else maps directly.
    pub fn resolve_preset(&self, preset: Preset, gray: &GrayImage) -> ResolvedPreset {
        match preset {
            Preset::Text => ResolvedPreset::Text,
            Preset::Handwriting => ResolvedPreset::Handwriting,
            Preset::LowContrast => ResolvedPreset::LowContrast,
            Preset::Auto => {
                let std_dev = steps::statistics::std_dev(gray);
                let resolved = if std_dev < self.config.auto_stddev_threshold {
                    ResolvedPreset::LowContrast
                } else {
                    ResolvedPreset::Text
                };
                tracing::info!("Auto-detected preset: {} (stddev={:.2})", resolved, std_dev);
                resolved
            }
        }
    }

    /// Run the chain for a resolved preset on a grayscale image
    pub fn apply(
        &self,
        preset: ResolvedPreset,
        gray: GrayImage,
        timings: &mut Vec<StepTiming>,
    ) -> Result<GrayImage, PreprocessError> {
        match preset {
            ResolvedPreset::Handwriting => {
                let denoised = self.run_step("nl_means", timings, || {
                    steps::denoise::non_local_means(&gray, &HANDWRITING_NL_MEANS)
                })?;
                let enhanced = self.run_step("clahe", timings, || {
                    steps::contrast::clahe(&denoised, &HANDWRITING_CLAHE)
                })?;
                self.run_step("sharpen", timings, || {
                    Ok(steps::sharpen::kernel_sharpen(&enhanced))
                })
            }
            ResolvedPreset::LowContrast => {
                let equalized = self.run_step("equalize", timings, || {
                    Ok(steps::contrast::equalize(&gray))
                })?;
                let enhanced = self.run_step("clahe", timings, || {
                    steps::contrast::clahe(&equalized, &LOW_CONTRAST_CLAHE)
                })?;
                let binary = self.run_step("adaptive_threshold", timings, || {
                    steps::threshold::adaptive_gaussian(&enhanced, &LOW_CONTRAST_THRESHOLD)
                })?;
                let (result, inverted) =
                    steps::threshold::invert_if_dark(binary, self.config.invert_mean_threshold);
                if inverted {
                    tracing::info!("Thresholded image was mostly dark, inverted polarity");
                }
                Ok(result)
            }
            ResolvedPreset::Text => {
                let denoised = self.run_step("bilateral", timings, || {
                    steps::denoise::bilateral(&gray, &TEXT_BILATERAL)
                })?;
                let enhanced = self.run_step("clahe", timings, || {
                    steps::contrast::clahe(&denoised, &TEXT_CLAHE)
                })?;
                let sharpened = self.run_step("sharpen", timings, || {
                    Ok(steps::sharpen::kernel_sharpen(&enhanced))
                })?;
                self.run_step("blend", timings, || {
                    steps::sharpen::blend(&enhanced, TEXT_BLEND.0, &sharpened, TEXT_BLEND.1, 0.0)
                })
            }
        }
    }

    fn run_step<T, F>(
        &self,
        name: &str,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> Result<T, PreprocessError>
    where
        F: FnOnce() -> Result<T, PreprocessError>,
    {
        let step_start = Instant::now();
        let result = step_fn()?;
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms: step_start.elapsed().as_millis() as u64,
        });
        Ok(result)
    }
}
