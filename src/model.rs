use crate::decode::ValidatedImage;

/// Generation settings handed to the caption model with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    /// Maximum number of tokens in the generated sequence, BOS included.
    pub max_length: usize,
    /// Requested beam width.
    pub num_beams: usize,
    /// End beam search once `num_beams` hypotheses have finished.
    pub early_stopping: bool,
    /// Sample instead of picking the most likely token.
    pub do_sample: bool,
    pub temperature: f64,
    pub top_k: usize,
    pub top_p: f64,
    /// Seed for the sampler; unused when `do_sample` is off.
    pub seed: u64,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_length: 50,
            num_beams: 5,
            early_stopping: true,
            do_sample: false,
            temperature: 1.0,
            top_k: 50,
            top_p: 0.95,
            seed: 1337,
        }
    }
}

/// A single captioning job.
pub struct CaptionRequest {
    pub image: ValidatedImage,
    pub options: GenerationOptions,
}

/// Trait for models that turn an image into a raw caption.
///
/// Implementors are moved onto the [`crate::CaptionEngine`] thread and only
/// ever run one request at a time.
pub trait CaptionModel {
    /// The error type that can be returned during inference.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Runs inference on the given request and returns the raw caption text.
    fn run(&mut self, request: CaptionRequest) -> Result<String, Self::Error>;
}
