//! HTTP service that captions uploaded images with a pretrained BLIP model.
//!
//! An upload flows through [`validate_upload`], [`decode_image`], the
//! [`CaptionEngine`] running a [`CaptionModel`], and [`postprocess_caption`].
//! [`CaptionService`] sequences these steps and [`router`] exposes them over HTTP.

mod beam;
pub mod blip;
mod caption;
mod decode;
mod engine;
mod error;
mod model;
mod server;
mod service;
mod validate;

pub use caption::postprocess_caption;
pub use decode::{ValidatedImage, decode_image};
pub use engine::{CaptionEngine, CaptionEngineResponse};
pub use error::{CaptionError, DecodeError, InferenceError, ValidationError};
pub use model::{CaptionModel, CaptionRequest, GenerationOptions};
pub use server::{ApiError, ErrorResult, FILE_FIELD, router};
pub use service::{CaptionResult, CaptionService, CaptionStatus};
pub use validate::{
    DEFAULT_MAX_UPLOAD_BYTES, UploadRequest, ValidationConfig, validate_filename, validate_size,
    validate_upload,
};
