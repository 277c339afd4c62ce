use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use shoal::api::indexer::{router, IndexerState};
use shoal::config::IndexConfiguration;
use shoal::indexer::{IndexMapping, Indexer};
use shoal::metrics::ServiceMetrics;
use shoal::storage::{BlobSegmentStore, LocalSegmentStore, SegmentStore};

#[derive(Parser)]
#[command(name = "shoal-indexer")]
#[command(about = "Indexer: applies document mutations and publishes segments", long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "SHOAL_INDEXER_ADDR", default_value = "0.0.0.0:8082")]
    listen_addr: String,

    /// Local index directory; its name becomes the segment base name
    #[arg(long, env = "SHOAL_INDEX_DIR", default_value = "./data/corpus")]
    index_dir: PathBuf,

    /// Field mapping file (JSON); falls back to the built-in default
    #[arg(long, env = "SHOAL_MAPPING", default_value = "mapping.json")]
    mapping: PathBuf,

    /// Service configuration file (YAML); source of computed fields
    #[arg(long, env = "SHOAL_CONFIG")]
    config: Option<PathBuf>,

    /// Blob store bucket; with no bucket the local storage dir is used
    #[arg(long, env = "SHOAL_SEGMENT_BUCKET")]
    bucket: Option<String>,

    /// Local segment storage directory (stand-in for the blob store)
    #[arg(long, env = "SHOAL_SEGMENT_DIR", default_value = "./data/segments")]
    storage_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Starting shoal-indexer v{}", shoal::VERSION);

    let store: Arc<dyn SegmentStore> = match &args.bucket {
        Some(bucket) => {
            info!(bucket = %bucket, "publishing segments to blob store");
            Arc::new(BlobSegmentStore::from_env(bucket)?)
        }
        None => {
            info!(dir = %args.storage_dir.display(), "publishing segments to local store");
            Arc::new(LocalSegmentStore::new(&args.storage_dir)?)
        }
    };

    let computed_fields = match &args.config {
        Some(path) => IndexConfiguration::load(path)?.computed_fields,
        None => Vec::new(),
    };

    let mapping = IndexMapping::load_or_default(&args.mapping);
    let indexer = Indexer::open(&args.index_dir, mapping, computed_fields, store)?;
    info!(base = indexer.base_name(), dir = %args.index_dir.display(), "index opened");

    let indexer = Arc::new(indexer);
    let state = IndexerState {
        indexer: indexer.clone(),
        metrics: Arc::new(ServiceMetrics::new()?),
    };

    info!(address = %args.listen_addr, "indexer listening");
    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    indexer.close().await?;
    info!("index released");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
