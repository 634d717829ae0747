use prometheus::{Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub submissions_total: IntCounterVec,
    pub reconcile_fetches_total: IntCounterVec,
    pub poll_ticks_total: IntCounterVec,
    pub geocode_requests_total: IntCounter,
    pub geofences_count: IntGauge,
    pub submission_latency_seconds: HistogramVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let submissions_total = IntCounterVec::new(
            Opts::new(
                "geofence_submissions_total",
                "Geofence create/update/delete submissions by outcome",
            ),
            &["outcome"],
        )
        .expect("valid geofence_submissions_total metric");

        let reconcile_fetches_total = IntCounterVec::new(
            Opts::new(
                "geofence_reconcile_fetches_total",
                "Authoritative re-list fetches after mutations, by outcome",
            ),
            &["outcome"],
        )
        .expect("valid geofence_reconcile_fetches_total metric");

        let poll_ticks_total = IntCounterVec::new(
            Opts::new(
                "location_poll_ticks_total",
                "Live location poll ticks by outcome",
            ),
            &["outcome"],
        )
        .expect("valid location_poll_ticks_total metric");

        let geocode_requests_total = IntCounter::new(
            "geocode_requests_total",
            "Forward-geocoding requests actually issued after debounce",
        )
        .expect("valid geocode_requests_total metric");

        let geofences_count = IntGauge::new(
            "geofences_count",
            "Size of the authoritative geofence collection",
        )
        .expect("valid geofences_count metric");

        let submission_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "geofence_submission_latency_seconds",
                "Latency of submit-and-reconcile in seconds",
            ),
            &["outcome"],
        )
        .expect("valid geofence_submission_latency_seconds metric");

        registry
            .register(Box::new(submissions_total.clone()))
            .expect("register geofence_submissions_total");
        registry
            .register(Box::new(reconcile_fetches_total.clone()))
            .expect("register geofence_reconcile_fetches_total");
        registry
            .register(Box::new(poll_ticks_total.clone()))
            .expect("register location_poll_ticks_total");
        registry
            .register(Box::new(geocode_requests_total.clone()))
            .expect("register geocode_requests_total");
        registry
            .register(Box::new(geofences_count.clone()))
            .expect("register geofences_count");
        registry
            .register(Box::new(submission_latency_seconds.clone()))
            .expect("register geofence_submission_latency_seconds");

        Self {
            registry,
            submissions_total,
            reconcile_fetches_total,
            poll_ticks_total,
            geocode_requests_total,
            geofences_count,
            submission_latency_seconds,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
