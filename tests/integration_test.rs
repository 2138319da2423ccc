use base64::Engine;
use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::io::Cursor;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

// Use atomic counter to give each test a unique port
static PORT_COUNTER: AtomicU16 = AtomicU16::new(9500);

#[derive(Debug, Deserialize)]
struct PreprocessResponse {
    processed_image: String,
    preset_used: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct InfoResponse {
    service: String,
    version: String,
    supported_presets: Vec<String>,
    default_preset: String,
    max_file_size_bytes: usize,
}

struct TestServer {
    child: Child,
    port: u16,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with_args(&[]).await
    }

    async fn start_with_args(extra_args: &[&str]) -> Self {
        let port = PORT_COUNTER.fetch_add(1, Ordering::SeqCst);

        let child = Command::new(env!("CARGO_BIN_EXE_ocr-preprocess-server"))
            .args(["--host", "127.0.0.1", "--port", &port.to_string()])
            .args(extra_args)
            .spawn()
            .expect("Failed to start server");

        let server = Self { child, port };
        server.wait_until_ready().await;
        server
    }

    async fn wait_until_ready(&self) {
        let client = reqwest::Client::new();
        for _ in 0..100 {
            if let Ok(response) = client
                .get(format!("{}/health", self.base_url()))
                .send()
                .await
            {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("Server on port {} did not become ready", self.port);
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

fn png_bytes(image: DynamicImage) -> Vec<u8> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .expect("Failed to encode fixture");
    buffer
}

fn page_fixture(width: u32, height: u32) -> Vec<u8> {
    png_bytes(DynamicImage::ImageRgb8(RgbImage::from_fn(
        width,
        height,
        |x, y| {
            if y % 12 < 4 && x % 9 < 5 {
                Rgb([20, 20, 20])
            } else {
                Rgb([240, 240, 235])
            }
        },
    )))
}

async fn post_preprocess(
    client: &reqwest::Client,
    base_url: &str,
    bytes: Vec<u8>,
    preset: Option<&str>,
) -> reqwest::Response {
    let part = Part::bytes(bytes)
        .file_name("upload.png")
        .mime_str("image/png")
        .unwrap();
    let form = Form::new().part("file", part);

    let mut url = format!("{}/preprocess/", base_url);
    if let Some(preset) = preset {
        url = format!("{}?preset={}", url, preset);
    }

    client
        .post(&url)
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request")
}

fn decode_processed(response: &PreprocessResponse) -> DynamicImage {
    let png = base64::engine::general_purpose::STANDARD
        .decode(&response.processed_image)
        .expect("processed_image is not base64");
    image::load_from_memory(&png).expect("processed_image is not an image")
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response: HealthResponse = client
        .get(format!("{}/health", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(response.status, "online");
}

#[tokio::test]
async fn test_info_endpoint() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response: InfoResponse = client
        .get(format!("{}/info", server.base_url()))
        .send()
        .await
        .expect("Failed to send request")
        .json()
        .await
        .expect("Failed to parse response");

    assert_eq!(response.service, "OCR Image Preprocessor");
    assert!(!response.version.is_empty());
    assert_eq!(response.default_preset, "auto");
    for preset in ["text", "handwriting", "low_contrast", "auto"] {
        assert!(response.supported_presets.contains(&preset.to_string()));
    }
}

#[tokio::test]
async fn test_preprocess_text_preset() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = post_preprocess(
        &client,
        &server.base_url(),
        page_fixture(120, 80),
        Some("text"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: PreprocessResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.status, "success");
    assert_eq!(body.preset_used, "text");

    let output = decode_processed(&body);
    assert_eq!(output.dimensions(), (180, 120));
    assert_eq!(output.color(), image::ColorType::Rgb8);
}

#[tokio::test]
async fn test_preprocess_downscales_wide_upload() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = post_preprocess(
        &client,
        &server.base_url(),
        page_fixture(2500, 100),
        Some("low_contrast"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: PreprocessResponse = response.json().await.expect("Failed to parse response");
    let output = decode_processed(&body);
    assert_eq!(output.width(), 2000);
    assert_eq!(output.height(), 80);
}

#[tokio::test]
async fn test_auto_resolves_low_contrast_for_flat_image() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let flat = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_fn(64, 48, |x, y| {
        Luma([120 + ((x * 3 + y) % 4) as u8])
    })));

    let response = post_preprocess(&client, &server.base_url(), flat, None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: PreprocessResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.preset_used, "low_contrast");
    assert_eq!(decode_processed(&body).color(), image::ColorType::Rgb8);
}

#[tokio::test]
async fn test_auto_resolves_text_for_checkerboard() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let checker = png_bytes(DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, y| {
        if (x / 8 + y / 8) % 2 == 0 {
            Luma([0])
        } else {
            Luma([255])
        }
    })));

    let response = post_preprocess(&client, &server.base_url(), checker, Some("auto")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: PreprocessResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.preset_used, "text");
}

#[tokio::test]
async fn test_unknown_preset_falls_back_to_text() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = post_preprocess(
        &client,
        &server.base_url(),
        page_fixture(40, 40),
        Some("sepia"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: PreprocessResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.preset_used, "text");
}

#[tokio::test]
async fn test_empty_upload_is_rejected() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = post_preprocess(&client, &server.base_url(), Vec::new(), None).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.error, "Empty file received");
}

#[tokio::test]
async fn test_malformed_upload_fails_processing() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = post_preprocess(
        &client,
        &server.base_url(),
        b"this is not an image".to_vec(),
        Some("text"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.error, "Image processing failed.");
}

#[tokio::test]
async fn test_oversized_upload_is_rejected_with_413() {
    let server = TestServer::start_with_args(&["--max-file-size", "1000"]).await;
    let client = reqwest::Client::new();

    let response = post_preprocess(&client, &server.base_url(), vec![7u8; 5000], None).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert!(
        body.error.starts_with("Image too large"),
        "unexpected error: {}",
        body.error
    );
}

#[tokio::test]
async fn test_tiny_upload_is_processed() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = post_preprocess(&client, &server.base_url(), page_fixture(9, 9), None).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: PreprocessResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(decode_processed(&body).dimensions(), (14, 14));
}

#[tokio::test]
async fn test_missing_file_field() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let form = Form::new().text("note", "no file here");
    let response = client
        .post(format!("{}/preprocess/", server.base_url()))
        .multipart(form)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(body.error, "Missing file in request");
}

#[tokio::test]
async fn test_cors_allows_any_origin() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/health", server.base_url()))
        .header("Origin", "http://example.com")
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
}
