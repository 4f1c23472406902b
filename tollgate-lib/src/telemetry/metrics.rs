use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const ERROR_TYPE: &str = "error_type";
    pub const ROUTE: &str = "route";
    pub const TIER: &str = "tier";
    pub const STATUS_CODE: &str = "status_code";
    pub const METHOD: &str = "method";
    pub const VERSION: &str = "version";
}

pub mod values {
    pub const ERROR_RATE_LIMITED: &str = "rate_limited";
    pub const ERROR_CLIENT_KEY: &str = "client_key";
    pub const ERROR_UPSTREAM: &str = "upstream";
}

#[derive(Clone)]
pub struct Metrics {
    pub connections_total: Counter<u64>,
    pub connections_active: UpDownCounter<i64>,

    pub requests_total: Counter<u64>,
    pub requests_duration_seconds: Histogram<f64>,

    pub upstream_requests_total: Counter<u64>,
    pub upstream_errors_total: Counter<u64>,
    pub upstream_duration_seconds: Histogram<f64>,

    pub errors_total: Counter<u64>,

    // Rate limiting metrics
    pub rate_limit_requests_total: Counter<u64>,
    pub rate_limit_allowed_total: Counter<u64>,
    pub rate_limit_rejected_total: Counter<u64>,

    // Limiter group bookkeeping
    pub client_entries_created_total: Counter<u64>,
    pub client_entries_evicted_total: Counter<u64>,
    pub sweeps_total: Counter<u64>,

    pub client_key_errors_total: Counter<u64>,

    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            connections_total: meter
                .u64_counter("tollgate_connections_total")
                .with_description("Total number of connections accepted")
                .build(),
            connections_active: meter
                .i64_up_down_counter("tollgate_connections_active")
                .with_description("Number of active connections")
                .build(),

            requests_total: meter
                .u64_counter("tollgate_requests_total")
                .with_description("Total number of requests processed")
                .build(),
            requests_duration_seconds: meter
                .f64_histogram("tollgate_requests_duration_seconds")
                .with_description("Request duration in seconds, including rejected requests")
                .build(),

            upstream_requests_total: meter
                .u64_counter("tollgate_upstream_requests_total")
                .with_description("Total number of requests forwarded upstream")
                .build(),
            upstream_errors_total: meter
                .u64_counter("tollgate_upstream_errors_total")
                .with_description("Total number of upstream transport errors")
                .build(),
            upstream_duration_seconds: meter
                .f64_histogram("tollgate_upstream_duration_seconds")
                .with_description("Upstream round-trip duration in seconds")
                .build(),

            errors_total: meter
                .u64_counter("tollgate_errors_total")
                .with_description("Total number of errors")
                .build(),

            rate_limit_requests_total: meter
                .u64_counter("tollgate_rate_limit_requests_total")
                .with_description("Total number of requests evaluated by a limiter group")
                .build(),
            rate_limit_allowed_total: meter
                .u64_counter("tollgate_rate_limit_allowed_total")
                .with_description("Total number of requests admitted by a limiter group")
                .build(),
            rate_limit_rejected_total: meter
                .u64_counter("tollgate_rate_limit_rejected_total")
                .with_description(
                    "Total number of requests rejected by tier (client=429, route=503)",
                )
                .build(),

            client_entries_created_total: meter
                .u64_counter("tollgate_client_entries_created_total")
                .with_description("Total number of per-client limiter entries created")
                .build(),
            client_entries_evicted_total: meter
                .u64_counter("tollgate_client_entries_evicted_total")
                .with_description("Total number of idle per-client limiter entries evicted")
                .build(),
            sweeps_total: meter
                .u64_counter("tollgate_sweeps_total")
                .with_description("Total number of limiter sweeps run")
                .build(),

            client_key_errors_total: meter
                .u64_counter("tollgate_client_key_errors_total")
                .with_description(
                    "Total number of requests whose client key could not be extracted",
                )
                .build(),

            build_info: meter
                .u64_gauge("tollgate_build_info")
                .with_description("Build information (version)")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        self.build_info
            .record(1, &[KeyValue::new(labels::VERSION, version)]);
    }

    pub fn record_rate_limit_request(&self, route: &str) {
        self.rate_limit_requests_total
            .add(1, &[KeyValue::new(labels::ROUTE, route.to_string())]);
    }

    pub fn record_rate_limit_allowed(&self, route: &str) {
        self.rate_limit_allowed_total
            .add(1, &[KeyValue::new(labels::ROUTE, route.to_string())]);
    }

    pub fn record_rate_limit_rejection(&self, tier: &str, route: &str) {
        self.errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, values::ERROR_RATE_LIMITED)]);
        self.rate_limit_rejected_total.add(
            1,
            &[
                KeyValue::new(labels::TIER, tier.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
            ],
        );
    }

    pub fn record_client_entry_created(&self, route: &str) {
        self.client_entries_created_total
            .add(1, &[KeyValue::new(labels::ROUTE, route.to_string())]);
    }

    pub fn record_sweep(&self, route: &str, evicted: u64) {
        let attrs = &[KeyValue::new(labels::ROUTE, route.to_string())];
        self.sweeps_total.add(1, attrs);
        if evicted > 0 {
            self.client_entries_evicted_total.add(evicted, attrs);
        }
    }

    pub fn record_client_key_error(&self, route: &str) {
        self.client_key_errors_total
            .add(1, &[KeyValue::new(labels::ROUTE, route.to_string())]);
        self.record_error(values::ERROR_CLIENT_KEY);
    }

    pub fn record_upstream_request(&self, status_code: u16, duration: f64) {
        let attrs = &[KeyValue::new(labels::STATUS_CODE, status_code.to_string())];
        self.upstream_requests_total.add(1, attrs);
        self.upstream_duration_seconds.record(duration, attrs);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors_total.add(1, &[]);
        self.record_error(values::ERROR_UPSTREAM);
    }

    pub fn record_request(&self, method: &str, status_code: u16, route: &str) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
            ],
        );
    }

    pub fn record_request_duration(
        &self,
        duration: f64,
        method: &str,
        status_code: u16,
        route: &str,
    ) {
        self.requests_duration_seconds.record(
            duration,
            &[
                KeyValue::new(labels::METHOD, method.to_string()),
                KeyValue::new(labels::STATUS_CODE, status_code.to_string()),
                KeyValue::new(labels::ROUTE, route.to_string()),
            ],
        );
    }

    pub fn record_error(&self, error_type: &str) {
        self.errors_total
            .add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type.to_string())]);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("tollgate");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}

/// Metrics backed by a meter that is not exported anywhere.
///
/// Useful to exercise instrumented code paths without a global provider.
pub fn noop_metrics() -> Arc<Metrics> {
    let provider = SdkMeterProvider::builder().build();
    Arc::new(Metrics::new(opentelemetry::metrics::MeterProvider::meter(&provider, "tollgate")))
}
