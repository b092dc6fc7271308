use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use loadprobe_server::{http, metrics::AppMetrics, middleware::RequestTimer};

/// Fixed bind address, not configurable in this version.
const BIND_ADDR: &str = "0.0.0.0:8000";

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Registry + duration histogram; duplicate registration aborts startup.
    let metrics = web::Data::new(AppMetrics::new().expect("metrics registry"));

    let server = HttpServer::new(move || {
        App::new()
            // Timing sits inside CORS so every routed request is observed.
            .wrap(RequestTimer::new(metrics.get_ref()))
            .wrap(Cors::permissive())
            .app_data(metrics.clone())
            .configure(http::routes::init_routes)
    })
    .bind(BIND_ADDR)?;

    // Announce only once the port is actually held.
    log::info!("Backend running at http://{BIND_ADDR}");
    server.run().await
}
