//! # Prometheus Metrics Module
//!
//! Centralized metrics collection and exposure for the summarizer platform.
//!
//! - Request lifecycle counters (submitted, completed, failed, deduped)
//! - LLM call counters and latency histogram, by provider and outcome
//! - Content extraction duration histogram
//! - Circuit breaker state gauge, keyed by external service name
//! - Lock contention counter
//! - Thread-safe global registry via `once_cell`
//! - An actix-web middleware for automatic request instrumentation on the
//!   health/metrics surface
//!
//! ```rust
//! use summarizer_core::metrics::{metrics_handler, record_http_request};
//! ```

use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};

/// Global Prometheus metrics registry, initialized once at startup.
pub static METRICS_REGISTRY: Lazy<MetricsRegistry> = Lazy::new(MetricsRegistry::new);

/// Histogram buckets for request duration in seconds, 1ms to 5s.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Histogram buckets for end-to-end pipeline latency, 1s to 5min.
const PIPELINE_DURATION_BUCKETS: &[f64] = &[
    1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 180.0, 300.0,
];

/// Central metrics registry containing all application metrics.
pub struct MetricsRegistry {
    registry: Registry,

    /// HTTP request counter for the health/metrics surface.
    /// Labels: method, path, status.
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram.
    /// Labels: method, path.
    pub http_request_duration_seconds: HistogramVec,

    /// Requests submitted to the pipeline, by kind (url/forward).
    pub requests_submitted_total: CounterVec,

    /// Requests that reached a terminal status, by status
    /// (completed/failed/cancelled) and whether they were deduped.
    pub requests_terminal_total: CounterVec,

    /// LLM calls, by provider/model and outcome
    /// (success/retry/fallback/failure).
    pub llm_calls_total: CounterVec,

    /// LLM call latency in seconds, by provider/model.
    pub llm_call_duration_seconds: HistogramVec,

    /// Content extraction duration in seconds, by extractor kind
    /// (html/youtube).
    pub extraction_duration_seconds: HistogramVec,

    /// Summary contract validation failures, by field path.
    pub contract_violations_total: CounterVec,

    /// Circuit breaker state, by service name. 0=closed, 1=half-open,
    /// 2=open.
    pub circuit_breaker_state: GaugeVec,

    /// Lock acquisition contention, by outcome (acquired/held/expired).
    pub lock_acquisitions_total: CounterVec,

    /// Currently in-flight pipeline runs.
    pub active_pipeline_runs: Gauge,

    /// End-to-end pipeline duration, submission to terminal status.
    pub pipeline_duration_seconds: Histogram,

    /// Active database connections from the pool.
    pub db_connections_active: Gauge,

    /// Idle database connections in the pool.
    pub db_connections_idle: Gauge,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all metrics registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests processed"),
            &["method", "path", "status"],
        )
        .expect("failed to create http_requests_total metric");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request latency in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["method", "path"],
        )
        .expect("failed to create http_request_duration_seconds metric");

        let requests_submitted_total = CounterVec::new(
            Opts::new("requests_submitted_total", "Summarization requests submitted"),
            &["kind"],
        )
        .expect("failed to create requests_submitted_total metric");

        let requests_terminal_total = CounterVec::new(
            Opts::new(
                "requests_terminal_total",
                "Summarization requests reaching a terminal status",
            ),
            &["status", "deduped"],
        )
        .expect("failed to create requests_terminal_total metric");

        let llm_calls_total = CounterVec::new(
            Opts::new("llm_calls_total", "LLM provider calls"),
            &["provider", "model", "outcome"],
        )
        .expect("failed to create llm_calls_total metric");

        let llm_call_duration_seconds = HistogramVec::new(
            HistogramOpts::new("llm_call_duration_seconds", "LLM call latency in seconds")
                .buckets(PIPELINE_DURATION_BUCKETS.to_vec()),
            &["provider", "model"],
        )
        .expect("failed to create llm_call_duration_seconds metric");

        let extraction_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "extraction_duration_seconds",
                "Content extraction latency in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["extractor"],
        )
        .expect("failed to create extraction_duration_seconds metric");

        let contract_violations_total = CounterVec::new(
            Opts::new(
                "contract_violations_total",
                "Summary contract field validation failures",
            ),
            &["field"],
        )
        .expect("failed to create contract_violations_total metric");

        let circuit_breaker_state = GaugeVec::new(
            Opts::new("circuit_breaker_state", "Circuit breaker state by service"),
            &["service"],
        )
        .expect("failed to create circuit_breaker_state metric");

        let lock_acquisitions_total = CounterVec::new(
            Opts::new("lock_acquisitions_total", "Idempotency lock acquisition attempts"),
            &["outcome"],
        )
        .expect("failed to create lock_acquisitions_total metric");

        let active_pipeline_runs = Gauge::new(
            "active_pipeline_runs",
            "Number of summarization pipeline runs currently in flight",
        )
        .expect("failed to create active_pipeline_runs metric");

        let pipeline_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "pipeline_duration_seconds",
                "End-to-end pipeline duration in seconds",
            )
            .buckets(PIPELINE_DURATION_BUCKETS.to_vec()),
        )
        .expect("failed to create pipeline_duration_seconds metric");

        let db_connections_active = Gauge::new(
            "db_connections_active",
            "Number of active database connections in the pool",
        )
        .expect("failed to create db_connections_active metric");

        let db_connections_idle = Gauge::new(
            "db_connections_idle",
            "Number of idle database connections in the pool",
        )
        .expect("failed to create db_connections_idle metric");

        macro_rules! register_all {
            ($($metric:expr),+ $(,)?) => {
                $(registry.register(Box::new($metric.clone())).expect("failed to register metric");)+
            };
        }
        register_all!(
            http_requests_total,
            http_request_duration_seconds,
            requests_submitted_total,
            requests_terminal_total,
            llm_calls_total,
            llm_call_duration_seconds,
            extraction_duration_seconds,
            contract_violations_total,
            circuit_breaker_state,
            lock_acquisitions_total,
            active_pipeline_runs,
            pipeline_duration_seconds,
            db_connections_active,
            db_connections_idle,
        );

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            requests_submitted_total,
            requests_terminal_total,
            llm_calls_total,
            llm_call_duration_seconds,
            extraction_duration_seconds,
            contract_violations_total,
            circuit_breaker_state,
            lock_acquisitions_total,
            active_pipeline_runs,
            pipeline_duration_seconds,
            db_connections_active,
            db_connections_idle,
        }
    }

    /// Get the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Gather all metrics and encode them in Prometheus text format.
    pub fn gather(&self) -> Result<String, Box<dyn std::error::Error>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn record_http_request(method: &str, path: &str, status: &str) {
    METRICS_REGISTRY
        .http_requests_total
        .with_label_values(&[method, path, status])
        .inc();
}

pub fn observe_http_duration(method: &str, path: &str, duration_seconds: f64) {
    METRICS_REGISTRY
        .http_request_duration_seconds
        .with_label_values(&[method, path])
        .observe(duration_seconds);
}

pub fn record_request_submitted(kind: &str) {
    METRICS_REGISTRY
        .requests_submitted_total
        .with_label_values(&[kind])
        .inc();
}

pub fn record_request_terminal(status: &str, deduped: bool) {
    METRICS_REGISTRY
        .requests_terminal_total
        .with_label_values(&[status, if deduped { "true" } else { "false" }])
        .inc();
}

pub fn record_llm_call(provider: &str, model: &str, outcome: &str, duration_seconds: f64) {
    METRICS_REGISTRY
        .llm_calls_total
        .with_label_values(&[provider, model, outcome])
        .inc();
    METRICS_REGISTRY
        .llm_call_duration_seconds
        .with_label_values(&[provider, model])
        .observe(duration_seconds);
}

pub fn observe_extraction_duration(extractor: &str, duration_seconds: f64) {
    METRICS_REGISTRY
        .extraction_duration_seconds
        .with_label_values(&[extractor])
        .observe(duration_seconds);
}

pub fn record_contract_violation(field: &str) {
    METRICS_REGISTRY
        .contract_violations_total
        .with_label_values(&[field])
        .inc();
}

pub fn set_circuit_breaker_state(service: &str, state: f64) {
    METRICS_REGISTRY
        .circuit_breaker_state
        .with_label_values(&[service])
        .set(state);
}

pub fn record_lock_acquisition(outcome: &str) {
    METRICS_REGISTRY
        .lock_acquisitions_total
        .with_label_values(&[outcome])
        .inc();
}

pub fn increment_active_pipeline_runs() {
    METRICS_REGISTRY.active_pipeline_runs.inc();
}

pub fn decrement_active_pipeline_runs() {
    METRICS_REGISTRY.active_pipeline_runs.dec();
}

pub fn observe_pipeline_duration(duration_seconds: f64) {
    METRICS_REGISTRY.pipeline_duration_seconds.observe(duration_seconds);
}

pub fn update_db_pool_metrics(active: usize, idle: usize) {
    METRICS_REGISTRY.db_connections_active.set(active as f64);
    METRICS_REGISTRY.db_connections_idle.set(idle as f64);
}

/// Actix-web handler for the `/metrics` endpoint.
pub async fn metrics_handler() -> actix_web::HttpResponse {
    match METRICS_REGISTRY.gather() {
        Ok(metrics) => actix_web::HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(metrics),
        Err(e) => {
            tracing::error!(error = %e, "failed to gather metrics");
            actix_web::HttpResponse::InternalServerError()
                .body(format!("failed to gather metrics: {}", e))
        }
    }
}

/// Middleware for automatic HTTP request instrumentation on the
/// health/metrics surface.
pub struct MetricsMiddleware;

impl<S, B> actix_web::dev::Transform<S, actix_web::dev::ServiceRequest> for MetricsMiddleware
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type Transform = MetricsMiddlewareService<S>;
    type InitError = ();
    type Future = std::future::Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        std::future::ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> actix_web::dev::Service<actix_web::dev::ServiceRequest> for MetricsMiddlewareService<S>
where
    S: actix_web::dev::Service<
        actix_web::dev::ServiceRequest,
        Response = actix_web::dev::ServiceResponse<B>,
        Error = actix_web::Error,
    >,
    S::Future: 'static,
    B: 'static,
{
    type Response = actix_web::dev::ServiceResponse<B>;
    type Error = actix_web::Error;
    type Future =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>>>>;

    fn poll_ready(
        &self,
        ctx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: actix_web::dev::ServiceRequest) -> Self::Future {
        let start = std::time::Instant::now();
        let method = req.method().to_string();
        let path = req.path().to_string();

        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await?;
            let duration = start.elapsed().as_secs_f64();
            let status = res.status().as_u16().to_string();

            record_http_request(&method, &path, &status);
            observe_http_duration(&method, &path, duration);

            Ok(res)
        })
    }
}
