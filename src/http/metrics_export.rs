//! Prometheus scrape endpoint.

use actix_web::{get, web, HttpResponse, Responder};

use crate::metrics::AppMetrics;

/// Serves the full registry snapshot in the text exposition format.
#[get("/metrics")]
pub async fn export(metrics: web::Data<AppMetrics>) -> impl Responder {
    match metrics.export() {
        Ok(body) => HttpResponse::Ok()
            .content_type(metrics.content_type())
            .body(body),
        Err(err) => {
            log::error!("metrics export failed: {err}");
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(export);
}
