use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use image::{ImageFormat, RgbImage};
use infernum_caption::{
    CaptionEngine, CaptionModel, CaptionRequest, CaptionService, GenerationOptions,
    ValidationConfig, router,
};
use serde_json::{Value, json};
use std::{
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tower::ServiceExt;

const BOUNDARY: &str = "caption-test-boundary";

#[derive(Debug, thiserror::Error)]
#[error("cuda out of memory")]
struct OutOfMemory;

/// Stand-in captioner that records how often it runs.
struct FakeCaptioner {
    caption: Option<&'static str>,
    calls: Arc<AtomicUsize>,
}

impl CaptionModel for FakeCaptioner {
    type Error = OutOfMemory;

    fn run(&mut self, request: CaptionRequest) -> Result<String, Self::Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(request.options, GenerationOptions::default());
        self.caption.map(str::to_string).ok_or(OutOfMemory)
    }
}

fn app(caption: Option<&'static str>) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let model = FakeCaptioner {
        caption,
        calls: calls.clone(),
    };
    let service = CaptionService::new(
        CaptionEngine::new(model),
        ValidationConfig::default(),
        GenerationOptions::default(),
    );
    (router(Arc::new(service)), calls)
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    RgbImage::new(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

fn multipart_body(field: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload(field: &str, filename: &str, content: &[u8]) -> Request<Body> {
    Request::post("/generate-caption")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(field, filename, content)))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_is_always_healthy() {
    let (app, _) = app(None);

    // a failed request beforehand changes nothing
    let (status, _) = send(app.clone(), upload("file", "x.png", b"junk")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "healthy" }));
}

#[tokio::test]
async fn captions_a_tiny_png() {
    let (app, calls) = app(Some("a black pixel on a white background"));

    let (status, body) = send(app, upload("file", "tiny.png", &png(1, 1))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "caption": "A black pixel on a white background.",
            "status": "success",
            "image_size": "1x1",
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn missing_file_field() {
    let (app, calls) = app(Some("unused"));

    let (status, body) = send(app, upload("image", "test.png", &png(1, 1))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_multipart_request_has_no_file() {
    let (app, _) = app(Some("unused"));

    let request = Request::post("/generate-caption")
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(png(1, 1)))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));
}

#[tokio::test]
async fn empty_filename() {
    let (app, _) = app(Some("unused"));

    let (status, body) = send(app, upload("file", "", &png(1, 1))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No selected file" }));
}

#[tokio::test]
async fn disallowed_extension_never_reaches_decoder_or_model() {
    let (app, calls) = app(Some("unused"));

    // valid image bytes under a rejected name
    let (status, body) = send(app.clone(), upload("file", "photo.bmp", &png(2, 2))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "Invalid file type. Allowed types: PNG, JPG, JPEG, GIF" })
    );

    // corrupt bytes would fail decoding with a 500 if they got that far
    let (status, _) = send(app, upload("file", "notes.txt", b"not an image")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let (app, calls) = app(Some("unused"));

    let content = vec![0u8; 10 * 1024 * 1024 + 1];
    let (status, body) = send(app, upload("file", "huge.png", &content)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "File size exceeds 10MB limit" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn body_beyond_the_transport_limit_reads_as_oversized() {
    let (app, _) = app(Some("unused"));

    let content = vec![0u8; 12 * 1024 * 1024];
    let (status, body) = send(app, upload("file", "huge.png", &content)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "File size exceeds 10MB limit" }));
}

#[tokio::test]
async fn oversized_body_with_bad_extension_reports_the_extension() {
    let (app, _) = app(Some("unused"));

    let content = vec![0u8; 12 * 1024 * 1024];
    let (status, body) = send(app, upload("file", "photo.bmp", &content)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({ "error": "Invalid file type. Allowed types: PNG, JPG, JPEG, GIF" })
    );
}

#[tokio::test]
async fn file_part_without_filename_counts_as_missing() {
    let (app, calls) = app(Some("unused"));

    let mut content = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"\r\n\r\n"
    )
    .into_bytes();
    content.extend_from_slice(&png(1, 1));
    content.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::post("/generate-caption")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(content))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "No file uploaded" }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn corrupt_image_is_a_server_error_with_details() {
    let (app, calls) = app(Some("unused"));

    let (status, body) = send(app, upload("file", "broken.png", b"\x89PNG\r\n\x1a\nnope")).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Failed to process image");
    assert!(!body["details"].as_str().unwrap().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn model_failure_is_a_server_error_with_details() {
    let (app, calls) = app(None);

    let (status, body) = send(app, upload("file", "ok.jpeg", &png(3, 3))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({
            "error": "Failed to generate caption",
            "details": "model error: cuda out of memory",
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cors_allows_any_origin() {
    let (app, _) = app(None);

    let request = Request::get("/health")
        .header(header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
}
