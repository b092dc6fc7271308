//! Minimal demo HTTP server: one CPU-bound endpoint, a Prometheus scrape
//! endpoint, and a middleware that times every request.

pub mod http;
pub mod metrics;
pub mod middleware;
