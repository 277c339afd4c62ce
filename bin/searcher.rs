use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shoal::api::searcher::{router, SearcherState};
use shoal::indexer::IndexMapping;
use shoal::metrics::ServiceMetrics;
use shoal::searcher::LocalSearcher;
use shoal::storage::{BlobSegmentStore, LocalSegmentStore, SegmentStore};

#[derive(Parser)]
#[command(name = "shoal-searcher")]
#[command(about = "Searcher replica: serves one shard from downloaded segments", long_about = None)]
struct Args {
    /// Listen address
    #[arg(long, env = "SHOAL_SEARCHER_ADDR", default_value = "0.0.0.0:8081")]
    listen_addr: String,

    /// Shard this replica is bound to
    #[arg(long, env = "SHOAL_SHARD")]
    shard: u32,

    /// Segment base name to follow in the store
    #[arg(long, env = "SHOAL_BASE_NAME", default_value = "corpus")]
    base_name: String,

    /// Local segment cache directory
    #[arg(long, env = "SHOAL_CACHE_DIR", default_value = "./data/segment-cache")]
    cache_dir: PathBuf,

    /// Field mapping file (JSON); falls back to the built-in default
    #[arg(long, env = "SHOAL_MAPPING", default_value = "mapping.json")]
    mapping: PathBuf,

    /// Segment refresh cadence in seconds
    #[arg(long, env = "SHOAL_REFRESH_SECS", default_value = "300")]
    refresh_secs: u64,

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
    info!("Starting shoal-searcher v{} for shard {}", shoal::VERSION, args.shard);

    let store: Arc<dyn SegmentStore> = match &args.bucket {
        Some(bucket) => Arc::new(BlobSegmentStore::from_env(bucket)?),
        None => Arc::new(LocalSegmentStore::new(&args.storage_dir)?),
    };

    let mapping = IndexMapping::load_or_default(&args.mapping);
    let searcher = Arc::new(LocalSearcher::open(
        args.shard,
        &args.base_name,
        &args.cache_dir,
        store,
        &mapping,
    )?);

    // Pull whatever is already published before serving; an empty store is
    // fine, the replica starts on an empty snapshot.
    match searcher.refresh_once().await {
        Ok(true) => info!(segment = ?searcher.serving_segment(), "initial segment loaded"),
        Ok(false) => info!("no published segments yet"),
        Err(e) => warn!(error = %e, "initial segment load failed, serving empty snapshot"),
    }

    let shutdown = CancellationToken::new();
    let refresh_task = tokio::spawn(searcher.clone().run_refresh_loop(
        Duration::from_secs(args.refresh_secs),
        shutdown.clone(),
    ));

    let state = SearcherState {
        searcher: searcher.clone(),
        metrics: Arc::new(ServiceMetrics::new()?),
    };

    info!(address = %args.listen_addr, shard = args.shard, "searcher listening");
    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = refresh_task.await;
    info!("searcher drained");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
