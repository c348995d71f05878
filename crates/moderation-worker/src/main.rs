use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use moderation::ComplaintItem;
use moderation_worker::{
    BatchOrchestrator, BatchRequest, DisabledAdjudicator, FsObjectStore, HttpAdjudicator,
    InMemoryStore, InferenceProvider, TracingSink, WorkerConfig,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run one complaint moderation batch", long_about = None)]
struct Args {
    /// Worker configuration (TOML); MODERATION_* variables override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON array of complaint items to moderate
    #[arg(long)]
    input: PathBuf,

    /// Invocation payload, e.g. '{"batch_size": 20, "force_ai_analysis": true}'
    #[arg(long)]
    event: Option<String>,

    /// Directory for flagged payloads
    #[arg(long)]
    flagged_dir: Option<PathBuf>,

    /// Pretty-print the batch summary
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = WorkerConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.flagged_dir {
        config.flagged_dir = dir;
    }

    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let items: Vec<ComplaintItem> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing complaint items from {}", args.input.display()))?;

    let request: BatchRequest = match &args.event {
        Some(event) => serde_json::from_str(event).context("parsing --event payload")?,
        None => BatchRequest::default(),
    };

    let adjudicator: Arc<dyn InferenceProvider> = match config.adjudicator.clone() {
        Some(endpoint) => Arc::new(HttpAdjudicator::new(endpoint)),
        None => Arc::new(DisabledAdjudicator),
    };
    info!(
        items = items.len(),
        adjudicator = adjudicator.name(),
        flagged_dir = %config.flagged_dir.display(),
        "Moderation worker starting"
    );

    let objects = Arc::new(FsObjectStore::new(config.flagged_dir.clone()));
    let orchestrator = BatchOrchestrator::new(
        config,
        Arc::new(InMemoryStore::new(items)),
        adjudicator,
        objects,
        Arc::new(TracingSink),
    )?;

    let summary = orchestrator.run_batch(request).await?;
    let out = if args.pretty {
        serde_json::to_string_pretty(&summary)?
    } else {
        serde_json::to_string(&summary)?
    };
    println!("{out}");
    Ok(())
}
