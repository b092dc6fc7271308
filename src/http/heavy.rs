//! Synthetic CPU-bound endpoint.
//!
//! Exists to produce a reproducible, non-trivial latency sample for the
//! timing middleware. The busy loop runs synchronously on the worker thread,
//! so concurrent requests queue behind it — deliberate head-of-line blocking,
//! not something to "fix" with spawn_blocking.

use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;

/// Fixed iteration count; keeps the response sum deterministic.
pub const HEAVY_ITERATIONS: u64 = 10_000_000;

#[derive(Serialize)]
pub struct HeavyTaskResponse {
    pub message: &'static str,
    pub sum: f64,
}

/// Sum of square roots over `0..iterations`. Cannot fail; always finite.
pub fn heavy_sum(iterations: u64) -> f64 {
    (0..iterations).map(|i| (i as f64).sqrt()).sum()
}

#[get("/heavy-task")]
pub async fn heavy_task() -> impl Responder {
    let sum = heavy_sum(HEAVY_ITERATIONS);
    HttpResponse::Ok().json(HeavyTaskResponse {
        message: "Heavy task completed",
        sum,
    })
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(heavy_task);
}
