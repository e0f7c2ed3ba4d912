//! Observability: Prometheus metrics, the endpoint that serves them, and
//! `tracing` setup.

pub mod logging;
pub mod metrics;
pub mod server;

pub use logging::init_logging;
pub use metrics::CoreMetrics;
pub use server::serve_metrics;
