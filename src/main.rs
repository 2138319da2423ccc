use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod error;
mod preprocessing;
mod server;

#[derive(Parser, Debug)]
#[command(name = "ocr-preprocess-server")]
#[command(about = "Image preprocessing server that conditions uploads for OCR")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "8000")]
    pub port: u16,

    /// Preset used when a request does not name one (text, handwriting, low_contrast, auto)
    #[arg(long, env = "OCR_DEFAULT_PRESET", default_value = "auto")]
    pub default_preset: String,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Images wider than this are scaled down to it
    #[arg(long, env = "OCR_MAX_WIDTH", default_value = "2000")]
    pub max_width: u32,

    /// Upscale factor for images that stay within max width after scaling
    #[arg(long, env = "OCR_UPSCALE_FACTOR", default_value = "1.5")]
    pub upscale_factor: f32,

    /// Grayscale standard deviation below which "auto" picks low_contrast
    #[arg(long, env = "OCR_AUTO_STDDEV_THRESHOLD", default_value = "40")]
    pub auto_stddev_threshold: f64,

    /// Mean intensity below which the thresholded low_contrast output is inverted
    #[arg(long, env = "OCR_INVERT_MEAN_THRESHOLD", default_value = "127")]
    pub invert_mean_threshold: f64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::try_from(args)?;

    tracing::info!(
        "Starting ocr-preprocess-server v{}",
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Binding to {}:{}", config.host, config.port);

    server::run(config).await
}
