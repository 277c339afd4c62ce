use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::info;

use shoal::api::broker::{router, BrokerState};
use shoal::broker::{Broker, PlannerUnderstanding, RemoteSearcher};
use shoal::config::{IndexConfiguration, StopwordList};
use shoal::metrics::ServiceMetrics;
use shoal::planning::{QueryPlanner, StageRegistry};
use shoal::searcher::ShardSearcher;

#[derive(Parser)]
#[command(name = "shoal-broker")]
#[command(about = "Query broker: plans queries and fans them out across shards", long_about = None)]
struct Args {
    /// Listen port
    #[arg(long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Service configuration file (YAML)
    #[arg(long, env = "SHOAL_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Stopwords file (YAML); optional
    #[arg(long, env = "SHOAL_STOPWORDS")]
    stopwords: Option<PathBuf>,

    /// Planning pipeline to run on incoming queries
    #[arg(long, env = "SHOAL_PIPELINE", default_value = "default_pipeline")]
    pipeline: String,

    /// Searcher replicas as `shard=url`, comma separated
    /// (e.g. `0=http://10.0.0.5:8081,0=http://10.0.0.6:8081,1=http://10.0.0.7:8081`)
    #[arg(long, env = "SHOAL_SEARCHERS", value_delimiter = ',')]
    searchers: Vec<String>,

    /// Per-searcher call deadline in milliseconds
    #[arg(long, env = "SHOAL_SEARCHER_DEADLINE_MS")]
    searcher_deadline_ms: Option<u64>,
}

fn parse_searchers(entries: &[String], deadline: Option<Duration>) -> Result<Vec<Arc<dyn ShardSearcher>>> {
    let mut searchers: Vec<Arc<dyn ShardSearcher>> = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some((shard, url)) = entry.split_once('=') else {
            bail!("searcher entry '{entry}' is not in shard=url form");
        };
        let shard: u32 = shard
            .parse()
            .with_context(|| format!("invalid shard id in '{entry}'"))?;
        let mut searcher = RemoteSearcher::new(shard, url);
        if let Some(deadline) = deadline {
            searcher = searcher.with_timeout(deadline);
        }
        searchers.push(Arc::new(searcher));
    }
    Ok(searchers)
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
    info!("Starting shoal-broker v{}", shoal::VERSION);

    // Service configuration is load-bearing for the read path; parse
    // failures are fatal at startup.
    let config = IndexConfiguration::load(&args.config)?;
    if config.pipeline(&args.pipeline).is_none() {
        bail!(
            "pipeline '{}' is not defined in {}",
            args.pipeline,
            args.config.display()
        );
    }

    let registry = Arc::new(StageRegistry::with_builtin_stages());
    let mut planner = QueryPlanner::new(registry, config)?;
    if let Some(path) = &args.stopwords {
        let stopwords = StopwordList::load(path)?;
        info!(count = stopwords.stopwords.len(), "loaded stopword list");
        planner = planner.with_stopwords(&stopwords.stopwords);
    }

    let deadline = args.searcher_deadline_ms.map(Duration::from_millis);
    let searchers = parse_searchers(&args.searchers, deadline)?;
    info!(replicas = searchers.len(), "configured searcher replicas");

    let qu = Arc::new(PlannerUnderstanding::new(Arc::new(planner), &args.pipeline));
    let metrics = Arc::new(ServiceMetrics::new()?);
    let mut broker = Broker::new(qu, searchers).with_metrics(metrics.clone());
    if let Some(deadline) = deadline {
        broker = broker.with_per_searcher_deadline(deadline);
    }

    let state = BrokerState {
        broker: Arc::new(broker),
        metrics,
    };

    let addr = format!("0.0.0.0:{}", args.port);
    info!(address = %addr, "broker listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
