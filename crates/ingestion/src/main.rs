//! askroute batch indexer
//!
//! Indexes every PDF in `ingestion.source_dir` into the configured similarity
//! store, using each file name as the document id. Exits non-zero when any
//! file could not be indexed.

mod errors;
mod indexer;

use askroute_common::{config::AppConfig, embeddings, store, VERSION};
use indexer::Indexer;
use std::path::Path;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config);
    info!("Starting askroute indexer v{}", VERSION);

    let embedder = embeddings::create_embedder(&config.embedding)?;
    let store = store::build_store(&config, embedder).await?;

    let started = Instant::now();
    let source_dir = Path::new(&config.ingestion.source_dir);
    let report = Indexer::new(store, config.ingestion.concurrency)
        .run(source_dir)
        .await?;

    info!(
        indexed = report.indexed.len(),
        failed = report.failed.len(),
        chunks = report.total_chunks(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Indexing finished"
    );

    if !report.failed.is_empty() {
        for (path, reason) in &report.failed {
            error!(path = %path.display(), reason = %reason, "File not indexed");
        }
        anyhow::bail!("{} file(s) failed to index", report.failed.len());
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}
