//! Prometheus registry and the request-duration histogram.
//!
//! The registry is built once at startup and handed to the server as
//! `web::Data<AppMetrics>` so tests can spin up isolated registries instead
//! of sharing a process-wide global.

use prometheus::core::Collector;
use prometheus::{Encoder, HistogramOpts, HistogramVec, Registry, TextEncoder};
use thiserror::Error;

/// Latency buckets in seconds, strictly increasing, fixed at registration.
pub const DURATION_BUCKETS: &[f64] = &[0.1, 0.3, 0.5, 1.0, 1.5, 2.0, 5.0];

const DURATION_NAME: &str = "http_request_duration_seconds";
const DURATION_HELP: &str = "Duration of HTTP requests in seconds";

#[derive(Debug, Error)]
pub enum MetricsError {
    /// A metric name was registered twice. Fatal at startup.
    #[error("metric already registered: {0}")]
    Duplicate(String),
    /// Registry serialization (or registration plumbing) failed.
    #[error("metrics export failed: {0}")]
    Export(#[from] prometheus::Error),
}

/// All metric series owned by this process: the duration histogram plus the
/// default process metrics. Lives for the process lifetime.
pub struct AppMetrics {
    registry: Registry,
    request_duration: HistogramVec,
}

impl AppMetrics {
    /// Build a fresh registry with every series registered. All registration
    /// happens here, before the first observation.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let opts = HistogramOpts::new(DURATION_NAME, DURATION_HELP)
            .buckets(DURATION_BUCKETS.to_vec());
        let request_duration = HistogramVec::new(opts, &["method", "route", "status"])?;
        register(&registry, DURATION_NAME, Box::new(request_duration.clone()))?;

        // CPU time, resident memory, open fds. Sampled lazily at gather
        // time, so scrapes never block request handling.
        #[cfg(target_os = "linux")]
        register(
            &registry,
            "process",
            Box::new(prometheus::process_collector::ProcessCollector::for_self()),
        )?;

        Ok(Self {
            registry,
            request_duration,
        })
    }

    /// Histogram of request latency labeled by (method, route, status).
    /// Cloning the returned vec is cheap (internally ref-counted).
    pub fn request_duration(&self) -> &HistogramVec {
        &self.request_duration
    }

    /// Serialize every registered series in the Prometheus text format.
    /// Counter reads are atomic, so a scrape racing in-flight observations
    /// never sees a torn value.
    pub fn export(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| MetricsError::Export(prometheus::Error::Msg(e.to_string())))
    }

    /// Content type of the text exposition format.
    pub fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}

fn register(
    registry: &Registry,
    name: &str,
    collector: Box<dyn Collector>,
) -> Result<(), MetricsError> {
    registry.register(collector).map_err(|e| match e {
        prometheus::Error::AlreadyReg => MetricsError::Duplicate(name.to_owned()),
        other => MetricsError::Export(other),
    })
}
