pub mod heavy;
pub mod metrics_export;
pub mod routes;
