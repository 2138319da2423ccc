//! Image preprocessing for OCR
//!
//! A fixed pipeline (resize, grayscale, preset chain, unsharp mask, PNG encode)
//! whose middle section is chosen by a [`Preset`].

pub mod pipeline;
pub mod steps;

pub use pipeline::{Pipeline, PipelineConfig, Preset, PreprocessingResult, ResolvedPreset};
