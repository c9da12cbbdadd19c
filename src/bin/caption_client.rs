use argh::FromArgs;
use infernum_caption::FILE_FIELD;
use reqwest::multipart::{Form, Part};
use std::path::PathBuf;

// defaults for the client
const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 5000;

#[derive(FromArgs)]
/// Caption server client for uploading images and checking health
struct ClientArgs {
    /// the host to connect to
    #[argh(option, short = 'h', default = "DEFAULT_HOST.to_string()")]
    host: String,

    /// the port to connect to
    #[argh(option, short = 'p', default = "DEFAULT_PORT")]
    port: u16,

    /// command to execute: "caption" or "health"
    #[argh(subcommand)]
    command: ClientCommands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum ClientCommands {
    Caption(CaptionCommand),
    Health(HealthCommand),
}

#[derive(FromArgs)]
/// Upload an image and print its caption
#[argh(subcommand, name = "caption")]
struct CaptionCommand {
    /// the path to the image
    #[argh(option, short = 'i')]
    image_path: PathBuf,
}

#[derive(FromArgs)]
/// Check that the server is up
#[argh(subcommand, name = "health")]
struct HealthCommand {}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: ClientArgs = argh::from_env();

    let client = reqwest::Client::new();

    // format the host and port
    let addr = format!("{}:{}", args.host, args.port);

    let response = match args.command {
        ClientCommands::Caption(caption_command) => {
            let filename = caption_command
                .image_path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = tokio::fs::read(&caption_command.image_path).await?;
            let form = Form::new().part(FILE_FIELD, Part::bytes(bytes).file_name(filename));

            client
                .post(format!("http://{}/generate-caption", addr))
                .multipart(form)
                .send()
                .await?
        }
        ClientCommands::Health(_) => client.get(format!("http://{}/health", addr)).send().await?,
    };

    let status = response.status();
    let result = response.json::<serde_json::Value>().await?;
    println!("Status: {status}");
    println!("Result: {}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
