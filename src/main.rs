mod api;
mod config;
mod error;
mod prompt;
mod request;
mod writer;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use secrecy::ExposeSecret;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::api::InferenceClient;
use crate::config::{Config, Overrides, Workspace};
use crate::writer::ResultWriter;

const PREVIEW_CHARS: usize = 500;

#[derive(Parser)]
#[command(name = "vlannot")]
#[command(about = "Annotate videos with a remote multimodal model", long_about = None)]
struct Cli {
    /// Path to the video file
    video: PathBuf,
    /// Path to a prompt file (default: prompts/pov_annotation_prompt.txt)
    #[arg(long)]
    prompt: Option<PathBuf>,
    /// Frame extraction rate, 0.1 - 10.0
    #[arg(long)]
    fps: Option<f64>,
    /// Model identifier
    #[arg(long)]
    model: Option<String>,
    /// Generation temperature, 0.0 - 1.0
    #[arg(long)]
    temperature: Option<f64>,
    /// Remote call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = init_logging();

    match run(cli).await {
        Ok(()) => {
            tracing::info!("run finished successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = ?e, "run failed");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env(Overrides {
        model: cli.model,
        fps: cli.fps,
        temperature: cli.temperature,
        timeout_secs: cli.timeout,
    })?;

    let key_prefix: String = config.api_key.expose_secret().chars().take(8).collect();
    tracing::info!(
        video = %cli.video.display(),
        model = %config.model,
        fps = config.fps,
        temperature = config.temperature,
        "using API key: {key_prefix}..."
    );

    let workspace = Workspace::at(&std::env::current_dir()?);
    workspace.ensure()?;

    let prompt_text = prompt::load(&workspace.prompts, cli.prompt.as_deref())?;
    let generation_request = request::build(&cli.video, &prompt_text, &config)?;

    println!("Processing video: {}", cli.video.display());
    println!(
        "Model: {}, fps: {}, temperature: {}",
        config.model, config.fps, config.temperature
    );
    println!("Waiting for the inference service...");

    let client = InferenceClient::new(&config);
    let annotation = client.call(&generation_request).await?;

    println!("Done in {:.1} seconds", annotation.elapsed.as_secs_f64());

    let video_name = cli
        .video
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| cli.video.display().to_string());
    let writer = ResultWriter::new(&workspace.outputs);
    let saved = writer.save(&video_name, &annotation);

    println!("Results saved:");
    if let Some(path) = &saved.json {
        println!("  JSON: {}", path.display());
    }
    if let Some(path) = &saved.txt {
        println!("  TXT:  {}", path.display());
    }

    println!("\nFirst {PREVIEW_CHARS} characters of the annotation:");
    println!("{}", "-".repeat(50));
    let (preview, truncated) = preview(&annotation.text, PREVIEW_CHARS);
    println!("{preview}");
    if truncated {
        println!("...");
    }

    Ok(())
}

/// Truncate to at most `limit` characters, reporting whether anything was cut.
fn preview(text: &str, limit: usize) -> (String, bool) {
    let preview: String = text.chars().take(limit).collect();
    let truncated = text.chars().nth(limit).is_some();
    (preview, truncated)
}

fn init_logging() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::never(".", "annotation.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    guard
}
