use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::Arc;

/// Prometheus metrics shared by the shoal services.
///
/// One registry per process; each binary registers the same family set and
/// simply leaves the families it never touches at zero.
#[derive(Clone)]
pub struct ServiceMetrics {
    // Read path
    pub searches_total: CounterVec,
    pub search_latency: HistogramVec,
    pub fanout_width: Histogram,
    pub partial_failures_total: Counter,
    pub dedup_dropped_total: Counter,

    // Write path
    pub documents_indexed_total: Counter,
    pub documents_deleted_total: Counter,
    pub commits_total: CounterVec,

    registry: Arc<Registry>,
}

impl ServiceMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let searches_total = CounterVec::new(
            Opts::new("shoal_searches_total", "Searches served, by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(searches_total.clone()))?;

        let search_latency = HistogramVec::new(
            HistogramOpts::new("shoal_search_latency_seconds", "End-to-end search latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
            &["outcome"],
        )?;
        registry.register(Box::new(search_latency.clone()))?;

        let fanout_width = Histogram::with_opts(
            HistogramOpts::new(
                "shoal_fanout_width",
                "Searcher replicas dispatched per request",
            )
            .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
        )?;
        registry.register(Box::new(fanout_width.clone()))?;

        let partial_failures_total = Counter::with_opts(Opts::new(
            "shoal_broker_partial_failures_total",
            "Searcher failures absorbed by the partial-failure policy",
        ))?;
        registry.register(Box::new(partial_failures_total.clone()))?;

        let dedup_dropped_total = Counter::with_opts(Opts::new(
            "shoal_merge_dedup_dropped_total",
            "Duplicate results dropped at merge time",
        ))?;
        registry.register(Box::new(dedup_dropped_total.clone()))?;

        let documents_indexed_total = Counter::with_opts(Opts::new(
            "shoal_documents_indexed_total",
            "Documents upserted into the local index",
        ))?;
        registry.register(Box::new(documents_indexed_total.clone()))?;

        let documents_deleted_total = Counter::with_opts(Opts::new(
            "shoal_documents_deleted_total",
            "Documents deleted from the local index",
        ))?;
        registry.register(Box::new(documents_deleted_total.clone()))?;

        let commits_total = CounterVec::new(
            Opts::new("shoal_commits_total", "Commit and upload attempts, by result"),
            &["result"],
        )?;
        registry.register(Box::new(commits_total.clone()))?;

        Ok(Self {
            searches_total,
            search_latency,
            fanout_width,
            partial_failures_total,
            dedup_dropped_total,
            documents_indexed_total,
            documents_deleted_total,
            commits_total,
            registry: Arc::new(registry),
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Record one served search with its outcome label
    pub fn record_search(&self, outcome: &str, duration_secs: f64) {
        self.searches_total.with_label_values(&[outcome]).inc();
        self.search_latency
            .with_label_values(&[outcome])
            .observe(duration_secs);
    }

    /// Record one fan-out round: how wide it was, how many replicas failed
    pub fn record_fanout(&self, dispatched: usize, failed: usize) {
        self.fanout_width.observe(dispatched as f64);
        if failed > 0 {
            self.partial_failures_total.inc_by(failed as f64);
        }
    }

    pub fn record_dedup_dropped(&self, dropped: usize) {
        if dropped > 0 {
            self.dedup_dropped_total.inc_by(dropped as f64);
        }
    }

    pub fn record_index(&self, documents: usize) {
        self.documents_indexed_total.inc_by(documents as f64);
    }

    pub fn record_delete(&self) {
        self.documents_deleted_total.inc();
    }

    pub fn record_commit(&self, result: &str) {
        self.commits_total.with_label_values(&[result]).inc();
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new().expect("failed to create metrics registry")
    }
}
