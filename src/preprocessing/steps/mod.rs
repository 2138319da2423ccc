//! Individual preprocessing steps

pub mod contrast;
pub mod denoise;
pub mod encode;
pub mod grayscale;
pub mod resize;
pub mod sharpen;
pub mod statistics;
pub mod threshold;
