use axum::http::StatusCode;
use thiserror::Error;

/// Reasons an upload is rejected before any decoding happens.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The multipart body carried no `file` field.
    #[error("No file uploaded")]
    MissingFile,
    /// The `file` field had an empty filename.
    #[error("No selected file")]
    EmptyFilename,
    /// The filename extension is not in the allow-list.
    #[error("Invalid file type. Allowed types: {allowed}")]
    InvalidFileType { allowed: String },
    /// The upload is larger than the configured ceiling.
    #[error("File size exceeds {limit_mb}MB limit")]
    FileTooLarge { size: usize, limit_mb: usize },
}

/// The uploaded bytes could not be turned into an RGB image.
#[derive(Debug, Error)]
#[error("failed to decode image: {message}")]
pub struct DecodeError {
    pub message: String,
}

impl From<image::ImageError> for DecodeError {
    fn from(err: image::ImageError) -> Self {
        Self {
            message: err.to_string(),
        }
    }
}

/// The caption model failed, or the engine running it is gone.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("model error: {0}")]
    Model(String),
    #[error("model panicked: {0}")]
    Panicked(String),
    #[error("model returned an empty caption")]
    EmptyCaption,
    #[error("inference engine stopped")]
    EngineStopped,
}

/// Every way a caption request can fail.
#[derive(Debug, Error)]
pub enum CaptionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl CaptionError {
    /// HTTP status reported to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            CaptionError::Validation(_) => StatusCode::BAD_REQUEST,
            CaptionError::Decode(_) | CaptionError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Client-facing message. Server-side failures share a generic message
    /// and carry the diagnostic separately in [`CaptionError::details`].
    pub fn message(&self) -> String {
        match self {
            CaptionError::Validation(err) => err.to_string(),
            CaptionError::Decode(_) => "Failed to process image".to_string(),
            CaptionError::Inference(_) => "Failed to generate caption".to_string(),
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            CaptionError::Validation(_) => None,
            CaptionError::Decode(err) => Some(err.message.clone()),
            CaptionError::Inference(err) => Some(err.to_string()),
        }
    }
}
