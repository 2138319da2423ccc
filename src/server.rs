use crate::config::Config;
use crate::error::ApiError;
use crate::preprocessing::{Pipeline, Preset};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<Config>,
}

/// Query parameters of the preprocess endpoint
#[derive(Debug, Deserialize)]
pub struct PreprocessQuery {
    pub preset: Option<String>,
}

/// Preprocess response
#[derive(Serialize)]
pub struct PreprocessResponse {
    pub processed_image: String,
    pub preset_used: String,
    pub status: String,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    pub supported_presets: Vec<String>,
    pub default_preset: String,
    pub max_file_size_bytes: usize,
}

/// Build the router with all routes and middleware
pub fn router(config: Config) -> Router {
    let max_file_size = config.max_file_size;

    let state = AppState {
        pipeline: Arc::new(Pipeline::new(config.pipeline)),
        config: Arc::new(config),
    };

    Router::new()
        .route("/preprocess/", post(handle_preprocess))
        .route("/preprocess", post(handle_preprocess))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(max_file_size))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = router(config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handle preprocessing requests
async fn handle_preprocess(
    State(state): State<AppState>,
    Query(query): Query<PreprocessQuery>,
    mut multipart: Multipart,
) -> Result<Json<PreprocessResponse>, ApiError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut file_name: Option<String> = None;
    let mut content_type: Option<String> = None;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "Failed to parse multipart", &state))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            file_name = field.file_name().map(|s| s.to_string());
            content_type = field.content_type().map(|s| s.to_string());
            file_data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(e, "Failed to read file data", &state))?,
            );
        }
    }

    let data = file_data.ok_or(ApiError::MissingFile)?;

    let preset = match query.preset.as_deref() {
        Some(value) => Preset::parse_or_text(value),
        None => state.config.default_preset,
    };

    tracing::info!(
        "Received file: {}, content type: {}, size: {} bytes, preset: {}",
        file_name.as_deref().unwrap_or("<unnamed>"),
        content_type.as_deref().unwrap_or("<none>"),
        data.len(),
        preset
    );

    if data.is_empty() {
        return Err(ApiError::EmptyFile);
    }

    // CPU-bound; keep it off the async workers
    let pipeline = state.pipeline.clone();
    let outcome = tokio::task::spawn_blocking(move || pipeline.process_logged(&data, preset))
        .await
        .map_err(|e| {
            tracing::error!("Unhandled failure in preprocess task: {}", e);
            ApiError::Server(e.to_string())
        })?;

    let result = outcome.ok_or(ApiError::ProcessingFailed)?;

    tracing::info!(
        "Preprocessing completed in {}ms (pipeline {}ms), preset used: {}, output {}x{}",
        start.elapsed().as_millis(),
        result.total_time_ms,
        result.preset,
        result.image.width(),
        result.image.height()
    );

    Ok(Json(PreprocessResponse {
        processed_image: result.encoded,
        preset_used: result.preset.as_str().to_string(),
        status: "success".to_string(),
    }))
}

/// Body-limit rejections surface here as multipart errors; keep them as 413
fn multipart_error(error: MultipartError, context: &str, state: &AppState) -> ApiError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!(
            "Upload rejected, exceeds {} bytes: {}",
            state.config.max_file_size,
            error
        );
        ApiError::ImageTooLarge {
            max: state.config.max_file_size,
        }
    } else {
        ApiError::InvalidRequest(format!("{}: {}", context, error))
    }
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "online".to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        service: "OCR Image Preprocessor".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        supported_presets: Preset::ALL.iter().map(|p| p.as_str().to_string()).collect(),
        default_preset: state.config.default_preset.as_str().to_string(),
        max_file_size_bytes: state.config.max_file_size,
    })
}
