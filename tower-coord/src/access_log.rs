use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use axum::body::Body;
use axum::extract::Request;
use axum::response::Response;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;
use tokio::time::Instant;
use tower::Layer;
use tower::Service;
use tower_http::LatencyUnit;
use tower_http::classify::ServerErrorsAsFailures;
use tower_http::classify::SharedClassifier;
use tower_http::trace::DefaultMakeSpan;
use tower_http::trace::DefaultOnRequest;
use tower_http::trace::DefaultOnResponse;
use tower_http::trace::Trace;
use tower_http::trace::TraceLayer;
use tracing::Level;

#[derive(Clone, Debug)]
struct AccessMetrics {
    requests: Counter<u64>,
    duration: Histogram<f64>,
}

/// Logs one line per request and records request counts and durations.
///
/// The log line comes from `tower_http`'s [`TraceLayer`]: an `INFO` span with
/// method and URI, closed by an `INFO` event carrying status and latency in
/// milliseconds. 5xx responses are additionally reported at `ERROR`.
#[derive(Clone, Debug)]
pub struct AccessLogLayer {
    trace: TraceLayer<SharedClassifier<ServerErrorsAsFailures>>,
    metrics: AccessMetrics,
}

impl AccessLogLayer {
    pub fn new() -> Self {
        let meter = global::meter("http");
        Self {
            trace: TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::DEBUG))
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
            metrics: AccessMetrics {
                requests: meter.u64_counter("http_requests_total").build(),
                duration: meter.f64_histogram("http_request_duration_seconds").build(),
            },
        }
    }
}

impl Default for AccessLogLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner: self.trace.layer(HttpMetrics {
                inner,
                metrics: self.metrics.clone(),
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AccessLogService<S> {
    inner: Trace<HttpMetrics<S>, SharedClassifier<ServerErrorsAsFailures>>,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response> + 'static,
    S::Future: Send + 'static,
    S::Error: fmt::Display + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let future = self.inner.call(req);
        // The trace body reports end of stream; re-box it as a plain axum body
        Box::pin(async move { future.await.map(|response| response.map(Body::new)) })
    }
}

/// Request counter and latency histogram, labelled by method and path.
#[derive(Clone, Debug)]
pub struct HttpMetrics<S> {
    inner: S,
    metrics: AccessMetrics,
}

impl<S> Service<Request> for HttpMetrics<S>
where
    S: Service<Request, Response = Response> + 'static,
    S::Future: Send + 'static,
    S::Error: 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let start = Instant::now();
        let metrics = self.metrics.clone();
        let future = self.inner.call(req);

        Box::pin(async move {
            let result = future.await;
            let latency = start.elapsed();
            // An inner error is rendered by an outer layer; count it as a 500 here
            let status = result
                .as_ref()
                .map(|response| response.status().as_u16())
                .unwrap_or(500);

            let attributes = [
                KeyValue::new("method", method.to_string()),
                KeyValue::new("path", path),
            ];
            metrics.duration.record(latency.as_secs_f64(), &attributes);
            let [method, path] = attributes;
            metrics
                .requests
                .add(1, &[method, path, KeyValue::new("status", i64::from(status))]);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use axum::body::Body;
    use axum::response::IntoResponse;
    use http::StatusCode;
    use tower::ServiceExt;
    use tower::service_fn;

    use super::*;

    #[tokio::test]
    async fn it_is_transparent() {
        let svc = AccessLogLayer::new().layer(service_fn(|_req: Request| async {
            Ok::<_, Infallible>((StatusCode::ACCEPTED, "queued").into_response())
        }));
        let response = svc
            .oneshot(http::Request::builder().uri("/page").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"queued");
    }

    #[tokio::test]
    async fn it_passes_server_errors_through() {
        let svc = AccessLogLayer::new().layer(service_fn(|_req: Request| async {
            Ok::<_, Infallible>(StatusCode::SERVICE_UNAVAILABLE.into_response())
        }));
        let response = svc
            .oneshot(http::Request::builder().uri("/order").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
