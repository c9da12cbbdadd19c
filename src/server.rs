use crate::{
    error::{CaptionError, ValidationError},
    service::CaptionService,
    validate::{UploadRequest, ValidationConfig, validate_filename},
};
use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Multipart field that carries the image.
pub const FILE_FIELD: &str = "file";

/// Extra room above the upload ceiling for multipart boundaries and headers,
/// so oversized files reach the validator instead of the body limit.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failures surfaced by the HTTP layer.
#[derive(Debug)]
pub enum ApiError {
    Caption(CaptionError),
    Multipart(MultipartError),
}

impl From<CaptionError> for ApiError {
    fn from(err: CaptionError) -> Self {
        ApiError::Caption(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Caption(err) => (
                err.status(),
                ErrorResult {
                    error: err.message(),
                    details: err.details(),
                },
            ),
            ApiError::Multipart(err) => (
                StatusCode::BAD_REQUEST,
                ErrorResult {
                    error: "Invalid multipart request".to_string(),
                    details: Some(err.body_text()),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// Builds the HTTP router: `POST /generate-caption`, `GET /health`, CORS open
/// to every origin.
pub fn router(service: Arc<CaptionService>) -> Router {
    let body_limit = service.validation().max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/generate-caption", post(generate_caption))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(service)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

async fn generate_caption(
    State(service): State<Arc<CaptionService>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let upload = read_upload(multipart, service.validation()).await.inspect_err(|e| match e {
        ApiError::Caption(err) => log::warn!("Rejected upload: {err}"),
        ApiError::Multipart(err) => log::warn!("Malformed multipart body: {err}"),
    })?;

    let result = service.caption(upload).await?;
    Ok((StatusCode::OK, Json(result)))
}

/// Pulls the `file` field out of the multipart body. Requests that are not
/// multipart at all count as having no file, and so does a `file` part sent
/// without a filename.
///
/// The filename is checked before the content is read, so an oversized body
/// with a bad name still reports the name.
async fn read_upload(
    multipart: Result<Multipart, MultipartRejection>,
    config: &ValidationConfig,
) -> Result<UploadRequest, ApiError> {
    let Ok(mut multipart) = multipart else {
        return Err(CaptionError::from(ValidationError::MissingFile).into());
    };

    let max_bytes = config.max_upload_bytes;
    let to_api_error = |err: MultipartError| {
        // a body over the limit is the same failure as an oversized file
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::from(CaptionError::from(ValidationError::FileTooLarge {
                size: max_bytes + 1,
                limit_mb: max_bytes / (1024 * 1024),
            }))
        } else {
            ApiError::Multipart(err)
        }
    };

    while let Some(field) = multipart.next_field().await.map_err(to_api_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        validate_filename(&filename, config).map_err(CaptionError::from)?;

        let content = field.bytes().await.map_err(to_api_error)?;
        return Ok(UploadRequest::new(filename, content.to_vec()));
    }

    Err(CaptionError::from(ValidationError::MissingFile).into())
}
