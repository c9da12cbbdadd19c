use argh::FromArgs;
use infernum_caption::{
    CaptionEngine, CaptionService, GenerationOptions, ValidationConfig,
    blip::{BlipCaptioner, BlipConfig, BlipVariant},
    router,
};
use std::{path::PathBuf, sync::Arc};

// defaults for the server
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_MODEL_DIR: &str = "models/blip-image-captioning-base";

#[derive(FromArgs)]
/// Serves image captions generated by a BLIP model.
struct CaptionServerArgs {
    /// the host to run the server on
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to run the server on
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// directory with model.safetensors and tokenizer.json
    #[argh(option, short = 'm', default = "PathBuf::from(DEFAULT_MODEL_DIR)")]
    model_dir: PathBuf,

    /// use the large BLIP configuration instead of the base one
    #[argh(switch)]
    large: bool,

    /// largest accepted upload in MiB
    #[argh(option, default = "10")]
    max_upload_mb: usize,

    /// maximum caption length in tokens
    #[argh(option, default = "50")]
    max_length: usize,

    /// requested beam width
    #[argh(option, default = "5")]
    num_beams: usize,

    /// turn off early stopping of beam hypotheses
    #[argh(switch)]
    no_early_stopping: bool,

    /// sample tokens instead of greedy decoding
    #[argh(switch)]
    do_sample: bool,

    /// sampling temperature
    #[argh(option, default = "1.0")]
    temperature: f64,

    /// top-k cutoff when sampling
    #[argh(option, default = "50")]
    top_k: usize,

    /// nucleus (top-p) cutoff when sampling
    #[argh(option, default = "0.95")]
    top_p: f64,

    /// seed for the sampler
    #[argh(option, default = "1337")]
    seed: u64,
}

impl CaptionServerArgs {
    fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            max_length: self.max_length,
            num_beams: self.num_beams,
            early_stopping: !self.no_early_stopping,
            do_sample: self.do_sample,
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            seed: self.seed,
        }
    }

    fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            max_upload_bytes: self.max_upload_mb * 1024 * 1024,
            ..ValidationConfig::default()
        }
    }

    fn blip_config(&self) -> BlipConfig {
        BlipConfig {
            model_dir: self.model_dir.clone(),
            variant: if self.large {
                BlipVariant::Large
            } else {
                BlipVariant::Base
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: CaptionServerArgs = argh::from_env();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let model = BlipCaptioner::load(&args.blip_config())?;
    let service = Arc::new(CaptionService::new(
        CaptionEngine::new(model),
        args.validation_config(),
        args.generation_options(),
    ));

    // refuse to serve with a model that cannot caption
    service.warm_up().await?;

    let app = router(service);

    log::info!("🚀 Starting the caption server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl+C: {e}");
    }
}
