use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures inside the preprocessing pipeline.
///
/// The HTTP surface collapses all of these into one generic 500, but they stay
/// distinct here so logs say which stage gave up.
#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Decoded image has zero size")]
    EmptyImage,

    #[error("Unsupported preset: {0}")]
    UnsupportedPreset(String),

    #[error("Invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    #[error("Step '{stage}' failed: {reason}")]
    Transform { stage: &'static str, reason: String },

    #[error("Failed to encode PNG: {0}")]
    Encode(#[source] image::ImageError),
}

impl PreprocessError {
    /// Short tag for structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            PreprocessError::Decode(_) => "decode",
            PreprocessError::EmptyImage => "empty_image",
            PreprocessError::UnsupportedPreset(_) => "unsupported_preset",
            PreprocessError::InvalidConfig(_) => "invalid_config",
            PreprocessError::Transform { .. } => "transform",
            PreprocessError::Encode(_) => "encode",
        }
    }

    pub fn transform(stage: &'static str, reason: impl Into<String>) -> Self {
        PreprocessError::Transform {
            stage,
            reason: reason.into(),
        }
    }
}

/// Errors returned to HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Empty file received")]
    EmptyFile,

    #[error("Missing file in request")]
    MissingFile,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Image too large: upload exceeds {max} bytes")]
    ImageTooLarge { max: usize },

    #[error("Image processing failed.")]
    ProcessingFailed,

    #[error("Server error: {0}")]
    Server(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::EmptyFile => StatusCode::BAD_REQUEST,
            ApiError::MissingFile => StatusCode::BAD_REQUEST,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::ImageTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ProcessingFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}
