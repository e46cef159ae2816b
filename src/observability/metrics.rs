use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::info;

// Declare the static OnceCell to hold the Metrics.
static METRICS_INSTANCE: OnceCell<Arc<Metrics>> = OnceCell::const_new();

/// Asynchronously initializes and gets a reference to the process-wide `Metrics`.
pub async fn get_metrics() -> &'static Arc<Metrics> {
    METRICS_INSTANCE
        .get_or_init(|| async {
            info!("Initializing Metrics ...");
            Metrics::new()
        })
        .await
}

#[derive(Clone)]
pub struct Metrics {
    pub registry: Registry,

    // Credential metrics
    pub credential_refresh: IntCounterVec,
    pub credential_refresh_coalesced: IntCounter,
    pub token_store_writes: IntCounterVec,
    pub activation_events: IntCounterVec,

    // Upstream metrics
    pub upstream_requests: IntCounterVec,
    pub upstream_duration: Histogram,

    pub up: IntGauge,
}

impl Metrics {
    fn new() -> Arc<Self> {
        let registry = Registry::new_custom(Some("thermogw".into()), None).unwrap();

        let metrics: Arc<Metrics> = Arc::new(Self {
            credential_refresh: IntCounterVec::new(Opts::new("credential_refresh_total", "Upstream refresh calls by outcome"), &["outcome"]).unwrap(),
            credential_refresh_coalesced: IntCounter::new("credential_refresh_coalesced_total", "Refresh requests served by an in-flight refresh").unwrap(),
            token_store_writes: IntCounterVec::new(Opts::new("token_store_writes_total", "Refresh token persistence attempts"), &["outcome"]).unwrap(),
            activation_events: IntCounterVec::new(Opts::new("activation_events_total", "Device activation lifecycle events"), &["event"]).unwrap(),

            upstream_requests: IntCounterVec::new(Opts::new("upstream_requests_total", "Vendor API requests by response status"), &["status"]).unwrap(),
            upstream_duration: Histogram::with_opts(HistogramOpts::new("upstream_request_duration_seconds", "Vendor API request duration seconds").buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])).unwrap(),

            up: IntGauge::new("up", "1 if service is serving").unwrap(),

            registry,
        });

        // Register all metrics in the registry
        let reg = &metrics.registry;
        reg.register(Box::new(metrics.credential_refresh.clone())).unwrap();
        reg.register(Box::new(metrics.credential_refresh_coalesced.clone())).unwrap();
        reg.register(Box::new(metrics.token_store_writes.clone())).unwrap();
        reg.register(Box::new(metrics.activation_events.clone())).unwrap();
        reg.register(Box::new(metrics.upstream_requests.clone())).unwrap();
        reg.register(Box::new(metrics.upstream_duration.clone())).unwrap();
        reg.register(Box::new(metrics.up.clone())).unwrap();

        metrics
    }
}
