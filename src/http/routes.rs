use crate::http;
use actix_web::web;

/// Mount every HTTP endpoint at the root. Anything else falls through to the
/// framework's default 404.
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.configure(http::metrics_export::init_routes)
        .configure(http::heavy::init_routes);
}
