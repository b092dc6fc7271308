//! Request-timing middleware.
//!
//! Wraps every route and records wall-clock latency into the duration
//! histogram, labeled by method, raw request path and final status. The
//! recording lives in a drop guard so exactly one observation fires per
//! request on every exit path: normal completion, handler error, or the
//! request future being dropped on client abort.

use std::time::Instant;

use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::StatusCode;
use actix_web::Error;
use futures_util::future::{ready, LocalBoxFuture, Ready};
use prometheus::HistogramVec;

use crate::metrics::AppMetrics;

/// Transform factory; wrap the `App` with this ahead of all routes.
pub struct RequestTimer {
    histogram: HistogramVec,
}

impl RequestTimer {
    pub fn new(metrics: &AppMetrics) -> Self {
        Self {
            histogram: metrics.request_duration().clone(),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RequestTimer
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = RequestTimerMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestTimerMiddleware {
            service,
            histogram: self.histogram.clone(),
        }))
    }
}

pub struct RequestTimerMiddleware<S> {
    service: S,
    histogram: HistogramVec,
}

impl<S, B> Service<ServiceRequest> for RequestTimerMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let mut timer = Timer::start(
            self.histogram.clone(),
            req.method().as_str().to_owned(),
            req.path().to_owned(),
        );
        let fut = self.service.call(req);

        Box::pin(async move {
            let res = fut.await;
            match &res {
                Ok(resp) => timer.finish(resp.status()),
                Err(err) => timer.finish(err.as_response_error().status_code()),
            }
            res
        })
    }
}

/// Scoped measurement: started on request entry, records on drop.
struct Timer {
    histogram: HistogramVec,
    start: Instant,
    method: String,
    route: String,
    status: Option<StatusCode>,
}

impl Timer {
    fn start(histogram: HistogramVec, method: String, route: String) -> Self {
        Self {
            histogram,
            // Monotonic clock; immune to wall-clock adjustments.
            start: Instant::now(),
            method,
            route,
            status: None,
        }
    }

    fn finish(&mut self, status: StatusCode) {
        self.status = Some(status);
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        // No status means the request future was dropped before a response
        // existed (client abort). 499 is the usual client-closed-request code.
        let status = self
            .status
            .map_or_else(|| "499".to_owned(), |s| s.as_u16().to_string());
        self.histogram
            .with_label_values(&[&self.method, &self.route, &status])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};

    fn sample_count(body: &str, method: &str, route: &str, status: &str) -> Option<u64> {
        let needle = format!(
            r#"http_request_duration_seconds_count{{method="{method}",route="{route}",status="{status}"}} "#
        );
        body.lines()
            .find(|l| l.starts_with(&needle))
            .and_then(|l| l.rsplit(' ').next())
            .and_then(|v| v.parse().ok())
    }

    #[actix_web::test]
    async fn records_one_observation_per_request() {
        let metrics = web::Data::new(AppMetrics::new().unwrap());
        let app = test::init_service(
            App::new()
                .wrap(RequestTimer::new(metrics.get_ref()))
                .route("/ok", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        for _ in 0..3 {
            let req = test::TestRequest::get().uri("/ok").to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let body = metrics.export().unwrap();
        assert_eq!(sample_count(&body, "GET", "/ok", "200"), Some(3));
    }

    #[actix_web::test]
    async fn handler_errors_are_timed_with_their_status() {
        let metrics = web::Data::new(AppMetrics::new().unwrap());
        let app = test::init_service(
            App::new()
                .wrap(RequestTimer::new(metrics.get_ref()))
                .route(
                    "/boom",
                    web::get().to(|| async {
                        Err::<HttpResponse, actix_web::Error>(
                            actix_web::error::ErrorInternalServerError("boom"),
                        )
                    }),
                ),
        )
        .await;

        let req = test::TestRequest::get().uri("/boom").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = metrics.export().unwrap();
        assert_eq!(sample_count(&body, "GET", "/boom", "500"), Some(1));
    }

    #[actix_web::test]
    async fn dropped_request_future_is_recorded_as_client_abort() {
        use actix_web::dev::Service as _;
        use std::future::Future;
        use std::task::{Context, Poll};

        let metrics = web::Data::new(AppMetrics::new().unwrap());
        let app = test::init_service(
            App::new()
                .wrap(RequestTimer::new(metrics.get_ref()))
                .route(
                    "/hang",
                    web::get().to(|| async {
                        std::future::pending::<HttpResponse>().await
                    }),
                ),
        )
        .await;

        // One poll routes the request and parks it in the handler; dropping
        // the future afterwards is what a client disconnect looks like.
        let req = test::TestRequest::get().uri("/hang").to_request();
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = Box::pin(app.call(req));
        assert!(matches!(fut.as_mut().poll(&mut cx), Poll::Pending));
        drop(fut);

        let body = metrics.export().unwrap();
        assert_eq!(sample_count(&body, "GET", "/hang", "499"), Some(1));
    }

    #[actix_web::test]
    async fn unmatched_paths_are_timed_under_their_raw_path() {
        let metrics = web::Data::new(AppMetrics::new().unwrap());
        let app = test::init_service(
            App::new().wrap(RequestTimer::new(metrics.get_ref())),
        )
        .await;

        let req = test::TestRequest::get().uri("/no-such-route").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body = metrics.export().unwrap();
        assert_eq!(sample_count(&body, "GET", "/no-such-route", "404"), Some(1));
    }
}
