//! BLIP image captioning on top of candle.
//!
//! Weights and tokenizer are read from a local checkout of the Hugging Face
//! model repository (`model.safetensors` and `tokenizer.json`).

use crate::{
    beam::BeamSearch,
    decode::ValidatedImage,
    model::{CaptionModel, CaptionRequest, GenerationOptions},
};
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{VarBuilder, ops::log_softmax};
use candle_transformers::{
    generation::{LogitsProcessor, Sampling},
    models::{blip, blip_text},
};
use image::imageops::{self, FilterType};
use std::path::PathBuf;
use tokenizers::Tokenizer;

const IMAGE_SIZE: usize = 384;
const IMAGE_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const IMAGE_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// `[DEC]` token that starts every caption.
const BOS_TOKEN_ID: u32 = 30522;
const SEP_TOKEN_ID: u32 = 102;

#[derive(Debug, thiserror::Error)]
pub enum BlipError {
    #[error("model file not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
}

/// Published BLIP captioning checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlipVariant {
    Base,
    Large,
}

impl BlipVariant {
    fn config(self) -> blip::Config {
        match self {
            BlipVariant::Base => blip_base_config(),
            BlipVariant::Large => blip::Config::image_captioning_large(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlipConfig {
    /// Directory holding `model.safetensors` and `tokenizer.json`.
    pub model_dir: PathBuf,
    pub variant: BlipVariant,
}

impl Default for BlipConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models/blip-image-captioning-base"),
            variant: BlipVariant::Base,
        }
    }
}

fn blip_base_config() -> blip::Config {
    let text_config = blip_text::Config {
        vocab_size: 30524,
        hidden_size: 768,
        encoder_hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 768,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        max_position_embeddings: 512,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-12,
        is_decoder: true,
    };
    let vision_config = blip::VisionConfig {
        hidden_size: 768,
        intermediate_size: 3072,
        projection_dim: 512,
        num_hidden_layers: 12,
        num_attention_heads: 12,
        image_size: IMAGE_SIZE,
        patch_size: 16,
        hidden_act: candle_nn::Activation::Gelu,
        layer_norm_eps: 1e-5,
    };

    blip::Config {
        text_config,
        vision_config,
        projection_dim: 512,
        image_text_hidden_size: 256,
    }
}

/// BLIP conditional-generation model plus its tokenizer.
pub struct BlipCaptioner {
    model: blip::BlipForConditionalGeneration,
    tokenizer: Tokenizer,
    device: Device,
}

impl BlipCaptioner {
    /// Loads weights and tokenizer from `config.model_dir`, on the first CUDA
    /// device when one is available and the CPU otherwise.
    pub fn load(config: &BlipConfig) -> Result<Self, BlipError> {
        let weights_path = config.model_dir.join("model.safetensors");
        let tokenizer_path = config.model_dir.join("tokenizer.json");
        for path in [&weights_path, &tokenizer_path] {
            if !path.is_file() {
                return Err(BlipError::MissingFile(path.clone()));
            }
        }

        let device = Device::cuda_if_available(0)?;
        log::info!("Loading BLIP weights from {}", weights_path.display());

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| BlipError::Tokenizer(e.to_string()))?;

        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };
        let model = blip::BlipForConditionalGeneration::new(&config.variant.config(), vb)?;

        log::info!("BLIP model ready on {device:?}");

        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }

    fn generate(
        &mut self,
        image: &ValidatedImage,
        options: &GenerationOptions,
    ) -> Result<String, BlipError> {
        let image_embeds = pixel_values(image)?
            .to_device(&self.device)?
            .unsqueeze(0)?
            .apply(self.model.vision_model())?;

        let token_ids = if options.num_beams > 1 && !options.do_sample {
            self.beam_search(&image_embeds, options)?
        } else {
            self.sample(&image_embeds, options)?
        };

        self.tokenizer
            .decode(&token_ids, true)
            .map_err(|e| BlipError::Tokenizer(e.to_string()))
    }

    /// Greedy or sampled decoding of a single hypothesis, feeding only the
    /// newest token once the kv cache is primed.
    fn sample(
        &mut self,
        image_embeds: &Tensor,
        options: &GenerationOptions,
    ) -> Result<Vec<u32>, BlipError> {
        // the decoder keeps its kv cache between calls
        self.model.reset_kv_cache();

        let mut logits_processor = LogitsProcessor::from_sampling(options.seed, sampling(options));
        let mut token_ids = vec![BOS_TOKEN_ID];

        for index in 0..options.max_length.saturating_sub(1) {
            let context_size = if index > 0 { 1 } else { token_ids.len() };
            let start_pos = token_ids.len().saturating_sub(context_size);
            let logits = self.next_token_logits(&token_ids[start_pos..], image_embeds)?;

            let token = logits_processor.sample(&logits)?;
            if token == SEP_TOKEN_ID {
                break;
            }
            token_ids.push(token);
        }
        Ok(token_ids)
    }

    /// Beam search over `num_beams` hypotheses. The kv cache holds a single
    /// sequence, so every beam replays its whole prefix on each step.
    fn beam_search(
        &mut self,
        image_embeds: &Tensor,
        options: &GenerationOptions,
    ) -> Result<Vec<u32>, BlipError> {
        let mut search = BeamSearch::new(
            vec![BOS_TOKEN_ID],
            options.num_beams,
            SEP_TOKEN_ID,
            options.early_stopping,
        );

        while !search.is_done() && search.sequence_len() < options.max_length {
            let mut log_probs = Vec::with_capacity(search.beams().len());
            for beam in search.beams() {
                self.model.reset_kv_cache();
                let logits = self.next_token_logits(&beam.tokens, image_embeds)?;
                log_probs.push(log_softmax(&logits, D::Minus1)?.to_vec1::<f32>()?);
            }
            search.step(&log_probs);
        }
        log::debug!("Beam search stopped after {} tokens", search.sequence_len());

        Ok(search.finish())
    }

    /// Decoder logits for the token following `input_ids`.
    fn next_token_logits(
        &mut self,
        input_ids: &[u32],
        image_embeds: &Tensor,
    ) -> Result<Tensor, BlipError> {
        let input_ids = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let logits = self
            .model
            .text_decoder()
            .forward(&input_ids, image_embeds)?
            .squeeze(0)?;
        Ok(logits.get(logits.dim(0)? - 1)?.to_dtype(DType::F32)?)
    }
}

impl CaptionModel for BlipCaptioner {
    type Error = BlipError;

    fn run(&mut self, request: CaptionRequest) -> Result<String, Self::Error> {
        self.generate(&request.image, &request.options)
    }
}

/// Sampling strategy for the decoder: greedy unless sampling is enabled.
fn sampling(options: &GenerationOptions) -> Sampling {
    if !options.do_sample {
        return Sampling::ArgMax;
    }
    Sampling::TopKThenTopP {
        k: options.top_k,
        p: options.top_p,
        temperature: options.temperature,
    }
}

/// Resizes to the model resolution (bicubic) and normalizes to a
/// `(3, 384, 384)` f32 tensor on the CPU.
fn pixel_values(image: &ValidatedImage) -> candle_core::Result<Tensor> {
    let resized = imageops::resize(
        image.pixels(),
        IMAGE_SIZE as u32,
        IMAGE_SIZE as u32,
        FilterType::CatmullRom,
    );
    let data = Tensor::from_vec(resized.into_raw(), (IMAGE_SIZE, IMAGE_SIZE, 3), &Device::Cpu)?
        .permute((2, 0, 1))?;
    let mean = Tensor::new(&IMAGE_MEAN, &Device::Cpu)?.reshape((3, 1, 1))?;
    let std = Tensor::new(&IMAGE_STD, &Device::Cpu)?.reshape((3, 1, 1))?;

    (data.to_dtype(DType::F32)? / 255.)?
        .broadcast_sub(&mean)?
        .broadcast_div(&std)
}
