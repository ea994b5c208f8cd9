use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;
use std::task::ready;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::response::Response;
use futures::FutureExt;
use futures::future::CatchUnwind;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;
use opentelemetry::metrics::Meter;
use pin_project_lite::pin_project;
use tokio::time::Instant;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tracing::error;

use crate::CoordError;

#[derive(Clone, Debug)]
struct RecoveryMetrics {
    successes: Counter<u64>,
    panics: Counter<u64>,
    duration: Histogram<f64>,
}

impl RecoveryMetrics {
    fn new(meter: &Meter) -> Self {
        Self {
            successes: meter.u64_counter("recovery_success_total").build(),
            panics: meter.u64_counter("recovery_panic_total").build(),
            duration: meter.f64_histogram("recovery_duration_seconds").build(),
        }
    }
}

/// Outermost safety net of a chain.
///
/// A panic anywhere below, whether while building the response future or
/// while polling it, becomes a single `500` with a JSON body. Errors returned
/// by the inner service are treated the same way, so the wrapped service is
/// infallible.
#[derive(Clone, Debug)]
pub struct RecoveryLayer {
    metrics: RecoveryMetrics,
}

impl RecoveryLayer {
    pub fn new() -> Self {
        Self::with_meter(&global::meter("recovery"))
    }

    pub fn with_meter(meter: &Meter) -> Self {
        Self {
            metrics: RecoveryMetrics::new(meter),
        }
    }
}

impl Default for RecoveryLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService {
            inner,
            unready: None,
            metrics: self.metrics.clone(),
        }
    }
}

#[derive(Debug)]
pub struct RecoveryService<S> {
    inner: S,
    // Readiness error held over to the next call
    unready: Option<String>,
    metrics: RecoveryMetrics,
}

impl<S: Clone> Clone for RecoveryService<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            unready: None,
            metrics: self.metrics.clone(),
        }
    }
}

/// Records the request duration when dropped, however the request ended.
struct Timer {
    start: Instant,
    duration: Histogram<f64>,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.duration
            .record(self.start.elapsed().as_secs_f64(), &[]);
    }
}

pin_project! {
    #[project = StateProj]
    enum State<F> {
        Running {
            #[pin]
            future: CatchUnwind<AssertUnwindSafe<F>>,
        },
        Failed {
            reason: Option<String>,
        },
    }
}

pin_project! {
    pub struct RecoveryFuture<F> {
        #[pin]
        state: State<F>,
        metrics: RecoveryMetrics,
        _timer: Timer,
    }
}

impl<F, E> Future for RecoveryFuture<F>
where
    F: Future<Output = Result<Response, E>>,
    E: Into<BoxError>,
{
    type Output = Result<Response, std::convert::Infallible>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let response = match this.state.project() {
            StateProj::Running { future } => match ready!(future.poll(cx)) {
                Ok(Ok(response)) => {
                    this.metrics.successes.add(1, &[]);
                    response
                }
                Ok(Err(err)) => {
                    let err: BoxError = err.into();
                    error!(error = %err, "unhandled error in request chain");
                    CoordError::Internal.into_response()
                }
                Err(payload) => {
                    this.metrics.panics.add(1, &[]);
                    error!(panic = %panic_message(payload.as_ref()), "recovered from panic");
                    CoordError::Internal.into_response()
                }
            },
            StateProj::Failed { reason } => {
                let reason = reason.take().unwrap_or_default();
                error!(error = %reason, "request chain failed before running");
                CoordError::Internal.into_response()
            }
        };
        Poll::Ready(Ok(response))
    }
}

impl<S> Service<Request> for RecoveryService<S>
where
    S: Service<Request, Response = Response>,
    S::Error: Into<BoxError>,
{
    type Response = Response;
    type Error = std::convert::Infallible;
    type Future = RecoveryFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        match self.inner.poll_ready(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(Ok(())),
            Poll::Ready(Err(err)) => {
                self.unready = Some(err.into().to_string());
                Poll::Ready(Ok(()))
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let timer = Timer {
            start: Instant::now(),
            duration: self.metrics.duration.clone(),
        };
        let state = match self.unready.take() {
            Some(reason) => State::Failed {
                reason: Some(reason),
            },
            None => match std::panic::catch_unwind(AssertUnwindSafe(|| self.inner.call(req))) {
                Ok(future) => State::Running {
                    future: AssertUnwindSafe(future).catch_unwind(),
                },
                Err(payload) => {
                    self.metrics.panics.add(1, &[]);
                    State::Failed {
                        reason: Some(format!("panic: {}", panic_message(payload.as_ref()))),
                    }
                }
            },
        };
        RecoveryFuture {
            state,
            metrics: self.metrics.clone(),
            _timer: timer,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}
