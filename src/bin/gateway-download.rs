use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

use supervised_gateway::download::{BatchMode, BatchRequest, DownloadRequest};
use supervised_gateway::download::job::DEFAULT_SUBDIR;

#[derive(Parser)]
#[command(name = "gateway-download")]
#[command(about = "Download model files through a running gateway", long_about = None)]
struct Cli {
    /// Gateway base URL.
    #[arg(long, env = "DOWNLOADER_URL", default_value = "http://localhost:8000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download one file
    Fetch {
        /// Remote URL of the file
        #[arg(short = 'u', long = "source")]
        source: String,

        /// File name inside the model directory
        #[arg(short = 'n', long)]
        name: String,

        /// Model directory (unet, lora, loras, checkpoints, text_encoders, vae, diffusion_models)
        #[arg(short = 's', long, default_value = DEFAULT_SUBDIR)]
        subdir: String,
    },
    /// Download every item listed in a JSON file
    Batch {
        /// JSON array of {"url", "filename", "subdir"} objects
        #[arg(short, long)]
        file: PathBuf,

        /// Spread items over concurrent workers instead of one at a time
        #[arg(long)]
        partitioned: bool,

        /// Items per worker when partitioned
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let ok = match cli.command {
        Commands::Fetch { source, name, subdir } => {
            let request = DownloadRequest::new(source, name, subdir);
            let res = client
                .post(format!("{}/download", base))
                .json(&request)
                .send()
                .await?;
            print_response(res).await?
        }
        Commands::Batch { file, partitioned, batch_size } => {
            let items: Vec<DownloadRequest> = serde_json::from_str(&std::fs::read_to_string(&file)?)?;
            let batch = BatchRequest {
                items,
                mode: if partitioned { BatchMode::Partitioned } else { BatchMode::Sequential },
                batch_size,
            };
            let res = client
                .post(format!("{}/download/batch", base))
                .json(&batch)
                .send()
                .await?;
            print_response(res).await?
        }
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the gateway's answer. Returns false for error statuses.
async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        eprintln!("{}", rendered);
        return Ok(false);
    }

    println!("{}", rendered);
    Ok(true)
}
