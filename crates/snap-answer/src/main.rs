use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use quorum::{
    HistoryStore, InMemoryHistoryStore, JsonlHistoryStore, QuorumConfig, SharedHistoryStore,
    TaskController,
};
use snap_answer::{image, report, HttpVisionPort, VisionEndpointConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "snap-answer")]
#[command(about = "Answer the question in a photo by asking a vision model several times")]
struct Args {
    /// Image file to analyze
    #[arg(long, required_unless_present = "list_history")]
    image: Option<PathBuf>,

    /// Number of parallel samples (1-5)
    #[arg(long)]
    samples: Option<usize>,

    /// TOML file with quorum settings
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSONL history file; history is kept in memory when omitted
    #[arg(long)]
    history: Option<PathBuf>,

    /// Vision endpoint base URL (overrides SNAP_VISION_URL)
    #[arg(long)]
    endpoint: Option<String>,

    /// Vision model name (overrides SNAP_VISION_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Print stored history, newest first, and exit
    #[arg(long, default_value_t = false)]
    list_history: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let store: SharedHistoryStore = match &args.history {
        Some(path) => Arc::new(
            JsonlHistoryStore::open(path)
                .await
                .with_context(|| format!("Failed to open history file {}", path.display()))?,
        ),
        None => Arc::new(InMemoryHistoryStore::new()),
    };

    if args.list_history {
        if !store.is_persistent() {
            bail!("--list-history needs --history <FILE>");
        }
        let records = store.list().await.context("Failed to read history")?;
        println!("{}", report::render_history(&records));
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => QuorumConfig::from_file(path)?,
        None => QuorumConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(samples) = args.samples {
        config.samples = samples;
        config.validate()?;
    }

    let mut endpoint = VisionEndpointConfig::default();
    if let Some(url) = args.endpoint {
        endpoint.url = url;
    }
    if let Some(model) = args.model {
        endpoint.model = model;
    }

    let image_path = args.image.context("--image is required")?;
    let payload = image::load_image(&image_path).await?;

    info!(
        endpoint = %endpoint.url,
        model = %endpoint.model,
        samples = config.samples,
        "snap-answer starting"
    );

    let port = HttpVisionPort::new(endpoint).context("Failed to build HTTP client")?;
    let (controller, mut feed) = TaskController::new(config, Arc::new(port), store)?;
    let handle = controller.submit(payload)?;

    while let Some(update) = feed.recv().await {
        println!("{}", report::render_update(&update));
        if update.is_settled() {
            break;
        }
    }

    let outcome = handle.wait().await?;
    info!(
        task_id = %outcome.task_id,
        tag = %outcome.verdict.tag,
        saved = outcome.saved,
        "Task finished"
    );

    Ok(())
}
