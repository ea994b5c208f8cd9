use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::response::Response;
use tower::Layer;
use tower::Service;
use tower::util::BoxCloneSyncService;

use crate::guard::Guard;
use crate::guard::GuardLayer;

/// A request handler: an infallible service from request to response.
pub type Handler = BoxCloneSyncService<Request, Response, Infallible>;

/// Boxes any suitable service into a [`Handler`].
pub fn handler<S>(service: S) -> Handler
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
{
    BoxCloneSyncService::new(service)
}

/// A function from [`Handler`] to [`Handler`].
///
/// Any tower [`Layer`] whose service stays infallible can be used as an
/// interceptor, see [`Interceptor::layer`].
#[derive(Clone)]
pub struct Interceptor(Arc<dyn Fn(Handler) -> Handler + Send + Sync>);

impl Interceptor {
    pub fn new(wrap: impl Fn(Handler) -> Handler + Send + Sync + 'static) -> Self {
        Self(Arc::new(wrap))
    }

    pub fn layer<L>(layer: L) -> Self
    where
        L: Layer<Handler> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Infallible>
            + Clone
            + Send
            + Sync
            + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self::new(move |inner| BoxCloneSyncService::new(layer.layer(inner)))
    }

    pub fn wrap(&self, inner: Handler) -> Handler {
        (self.0)(inner)
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Interceptor").finish_non_exhaustive()
    }
}

impl<G> From<GuardLayer<G>> for Interceptor
where
    G: Guard + ?Sized + 'static,
{
    fn from(layer: GuardLayer<G>) -> Self {
        Self::layer(layer)
    }
}

/// Composes `interceptors` around `handler`.
///
/// The first interceptor is the outermost: it sees the request first and the
/// response last. An empty list returns `handler` unchanged.
pub fn chain(handler: Handler, interceptors: &[Interceptor]) -> Handler {
    interceptors
        .iter()
        .rev()
        .fold(handler, |inner, interceptor| interceptor.wrap(inner))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::body::Body;
    use axum::response::IntoResponse;
    use tower::ServiceExt;
    use tower::service_fn;

    use super::*;

    fn recording(log: Arc<Mutex<Vec<String>>>, name: &'static str) -> Interceptor {
        Interceptor::new(move |inner: Handler| {
            let log = Arc::clone(&log);
            handler(service_fn(move |req: Request| {
                let log = Arc::clone(&log);
                let inner = inner.clone();
                async move {
                    log.lock().unwrap().push(format!("{name} in"));
                    let response = inner.oneshot(req).await;
                    log.lock().unwrap().push(format!("{name} out"));
                    response
                }
            }))
        })
    }

    #[tokio::test]
    async fn first_interceptor_is_outermost() {
        let log = Arc::new(Mutex::new(vec![]));
        let end = {
            let log = Arc::clone(&log);
            handler(service_fn(move |_req: Request| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("handler".to_string());
                    Ok::<_, Infallible>("ok".into_response())
                }
            }))
        };

        let svc = chain(
            end,
            &[
                recording(log.clone(), "a"),
                recording(log.clone(), "b"),
                recording(log.clone(), "c"),
            ],
        );
        let _ = svc.oneshot(Request::new(Body::empty())).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec!["a in", "b in", "c in", "handler", "c out", "b out", "a out"]
        );
    }

    #[tokio::test]
    async fn empty_chain_is_the_handler() {
        let end = handler(service_fn(|_req: Request| async {
            Ok::<_, Infallible>("plain".into_response())
        }));
        let response = chain(end, &[]).oneshot(Request::new(Body::empty())).await.unwrap();
        assert_eq!(response.status(), http::StatusCode::OK);
    }
}
