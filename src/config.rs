use crate::error::PreprocessError;
use crate::preprocessing::{PipelineConfig, Preset};
use crate::Args;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub default_preset: Preset,
    pub max_file_size: usize,
    pub pipeline: PipelineConfig,
}

impl TryFrom<Args> for Config {
    type Error = PreprocessError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let default_preset = args.default_preset.parse::<Preset>()?;

        let pipeline = PipelineConfig {
            max_width: args.max_width,
            upscale_factor: args.upscale_factor,
            auto_stddev_threshold: args.auto_stddev_threshold,
            invert_mean_threshold: args.invert_mean_threshold,
        };
        pipeline.validate()?;

        Ok(Self {
            host: args.host,
            port: args.port,
            default_preset,
            max_file_size: args.max_file_size,
            pipeline,
        })
    }
}
