use crate::{
    caption::postprocess_caption,
    decode::{ValidatedImage, decode_image},
    engine::CaptionEngine,
    error::{CaptionError, InferenceError},
    model::{CaptionRequest, GenerationOptions},
    validate::{UploadRequest, ValidationConfig, validate_upload},
};
use serde::{Deserialize, Serialize};

/// Successful response body of `POST /generate-caption`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionResult {
    pub caption: String,
    pub status: CaptionStatus,
    /// Dimensions of the decoded image as `WxH`.
    pub image_size: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptionStatus {
    Success,
}

/// Orchestrates validation, decoding, inference and post-processing for a
/// single upload.
pub struct CaptionService {
    engine: CaptionEngine,
    validation: ValidationConfig,
    options: GenerationOptions,
}

impl CaptionService {
    pub fn new(
        engine: CaptionEngine,
        validation: ValidationConfig,
        options: GenerationOptions,
    ) -> Self {
        Self {
            engine,
            validation,
            options,
        }
    }

    pub fn validation(&self) -> &ValidationConfig {
        &self.validation
    }

    /// Captions a blank image and discards the result, forcing the model to
    /// finish any lazy initialization before real traffic arrives.
    pub async fn warm_up(&self) -> Result<(), InferenceError> {
        let response = self
            .engine
            .caption(CaptionRequest {
                image: ValidatedImage::blank(384, 384),
                options: self.options.clone(),
            })
            .await?;
        log::info!("Warm-up inference finished in {:?}", response.duration);
        Ok(())
    }

    /// Runs the full pipeline on `upload`.
    ///
    /// Failures are logged here; the caller only maps them to a response.
    pub async fn caption(&self, upload: UploadRequest) -> Result<CaptionResult, CaptionError> {
        let result = self.run(upload).await;
        if let Err(err) = &result {
            match err {
                CaptionError::Validation(e) => log::warn!("Rejected upload: {e}"),
                _ => log::error!(
                    "{}: {}",
                    err.message(),
                    err.details().unwrap_or_default()
                ),
            }
        }
        result
    }

    async fn run(&self, upload: UploadRequest) -> Result<CaptionResult, CaptionError> {
        validate_upload(&upload, &self.validation)?;
        log::debug!(
            "Accepted upload '{}' ({} bytes)",
            upload.filename,
            upload.size()
        );

        let image = decode_image(&upload.content)?;
        let image_size = image.size_label();

        let response = self
            .engine
            .caption(CaptionRequest {
                image,
                options: self.options.clone(),
            })
            .await?;

        if response.caption.trim().is_empty() {
            return Err(InferenceError::EmptyCaption.into());
        }

        let caption = postprocess_caption(&response.caption);
        log::info!(
            "Captioned {image_size} image in {:?}: {caption}",
            response.duration
        );

        Ok(CaptionResult {
            caption,
            status: CaptionStatus::Success,
            image_size,
        })
    }
}
