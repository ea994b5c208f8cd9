use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::response::Response;
use http::HeaderMap;
use http::request::Parts;
use shot_coord::Decision;
use shot_coord::StoreError;
use tower::Layer;
use tower::Service;
use tracing::warn;

use crate::CoordError;
use crate::FailPolicy;

/// What a [`Guard`] wants done with a request.
#[derive(Debug)]
pub enum Admission {
    /// Forward the request; the headers are added to the eventual response.
    Continue(HeaderMap),
    /// Answer immediately without calling the inner service.
    ShortCircuit(CoordError),
    /// The store could not decide. The layer's [`FailPolicy`] picks the outcome.
    Degraded(StoreError),
}

impl Admission {
    /// Maps a primitive's decision: `Allow` continues, `Error` degrades and
    /// every other decision short-circuits with `refused`.
    pub fn from_decision<T>(decision: Decision<T>, refused: CoordError) -> Self {
        match decision {
            Decision::Allow(_) => Admission::Continue(HeaderMap::new()),
            Decision::Error(err) => Admission::Degraded(err),
            Decision::Deny | Decision::Empty | Decision::Conflict => Admission::ShortCircuit(refused),
        }
    }
}

/// A per-request admission check run in front of an inner service.
///
/// Guards see the request head only. They may read and add extensions, which
/// is how a guard hands data (a claimed work item, a session value) to the
/// handler behind it.
#[async_trait]
pub trait Guard: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    async fn admit(&self, parts: &mut Parts) -> Admission;
}

/// Runs a [`Guard`] in front of every request.
pub struct GuardLayer<G: ?Sized> {
    guard: Arc<G>,
    policy: FailPolicy,
}

// Deriving Clone would require `G: Clone`
impl<G: ?Sized> Clone for GuardLayer<G> {
    fn clone(&self) -> Self {
        Self {
            guard: Arc::clone(&self.guard),
            policy: self.policy,
        }
    }
}

impl<G: ?Sized> GuardLayer<G> {
    pub fn new(guard: Arc<G>) -> Self {
        Self {
            guard,
            policy: FailPolicy::default(),
        }
    }

    pub fn with_fail_policy(mut self, policy: FailPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn fail_policy(&self) -> FailPolicy {
        self.policy
    }
}

impl<G: ?Sized, S> Layer<S> for GuardLayer<G> {
    type Service = GuardService<G, S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            guard: Arc::clone(&self.guard),
            policy: self.policy,
        }
    }
}

pub struct GuardService<G: ?Sized, S> {
    inner: S,
    guard: Arc<G>,
    policy: FailPolicy,
}

impl<G: ?Sized, S: Clone> Clone for GuardService<G, S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            guard: Arc::clone(&self.guard),
            policy: self.policy,
        }
    }
}

impl<G, S> Service<Request> for GuardService<G, S>
where
    G: Guard + ?Sized + 'static,
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Response, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        // Take the service that was driven to readiness, leave a fresh clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let guard = Arc::clone(&self.guard);
        let policy = self.policy;

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let headers = match guard.admit(&mut parts).await {
                Admission::Continue(headers) => headers,
                Admission::ShortCircuit(err) => return Ok(err.into_response()),
                Admission::Degraded(err) => match policy {
                    FailPolicy::Open => {
                        warn!(guard = guard.name(), error = %err, "store unavailable, failing open");
                        HeaderMap::new()
                    }
                    FailPolicy::Closed => {
                        warn!(guard = guard.name(), error = %err, "store unavailable, failing closed");
                        return Ok(CoordError::StoreUnavailable.into_response());
                    }
                },
            };

            let mut response = inner.call(Request::from_parts(parts, body)).await?;
            response.headers_mut().extend(headers);
            Ok(response)
        })
    }
}
