use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use axum::Json;
use axum::Router;
use axum::extract::Request;
use axum::response::IntoResponse;
use axum::response::Response;
use clap::Parser;
use opentelemetry::global;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use serde_json::json;
use shot_coord::CoordinationStore;
use shot_coord::MemoryStore;
use shot_coord::RedisStore;
use tower::BoxError;
use tower::service_fn;
use tower_coord::AccessLogLayer;
use tower_coord::GuardLayer;
use tower_coord::HandoffItem;
use tower_coord::Handler;
use tower_coord::Interceptor;
use tower_coord::PageViews;
use tower_coord::RecoveryLayer;
use tower_coord::chain;
use tower_coord::config::Backend;
use tower_coord::config::Settings;
use tower_coord::handler;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Demo server guarding its routes with store-backed interceptors.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML settings file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the settings file.
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Redis URL, overrides the settings file.
    #[arg(long)]
    redis_url: Option<String>,

    /// Use the in-process store instead of Redis.
    #[arg(long)]
    memory: bool,

    /// Bearer token for the authenticated routes.
    #[arg(long, env = "AUTH_TOKEN")]
    auth_token: Option<String>,
}

impl Args {
    fn settings(self) -> Result<Settings, BoxError> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        if let Some(bind) = self.bind {
            settings.bind = bind;
        }
        if let Some(url) = self.redis_url {
            settings.store.url = url;
        }
        if self.memory {
            settings.store.backend = Backend::Memory;
        }
        if let Some(token) = self.auth_token {
            settings.auth_token = token;
        }
        Ok(settings)
    }
}

fn reply(body: serde_json::Value) -> Result<Response, Infallible> {
    Ok(Json(body).into_response())
}

async fn ping(_req: Request) -> Result<Response, Infallible> {
    reply(json!({"message": "pong"}))
}

async fn secure(_req: Request) -> Result<Response, Infallible> {
    reply(json!({"message": "secure ok"}))
}

async fn order(_req: Request) -> Result<Response, Infallible> {
    reply(json!({"status": "order processed"}))
}

async fn page(req: Request) -> Result<Response, Infallible> {
    let served = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let views = req.extensions().get::<PageViews>().map(|views| views.0);
    reply(json!({"status": "page served", "time": served, "views": views}))
}

async fn process(req: Request) -> Result<Response, Infallible> {
    let task = req
        .extensions()
        .get::<HandoffItem>()
        .map(|item| item.0.clone())
        .unwrap_or_default();
    reply(json!({"status": "processed", "task": task}))
}

async fn secure_session(_req: Request) -> Result<Response, Infallible> {
    reply(json!({"status": "secure access granted"}))
}

async fn update(_req: Request) -> Result<Response, Infallible> {
    reply(json!({"status": "update applied"}))
}

async fn connect(settings: &Settings) -> Result<Arc<dyn CoordinationStore>, BoxError> {
    Ok(match settings.store.backend {
        Backend::Redis => {
            let store = RedisStore::connect(&settings.store.url, settings.store.timeout).await?;
            info!(url = %settings.store.url, "connected to redis");
            Arc::new(store)
        }
        Backend::Memory => {
            info!("using the in-process store, state is not shared between instances");
            Arc::new(MemoryStore::new())
        }
    })
}

fn metrics(settings: &Settings) -> Result<Option<SdkMeterProvider>, BoxError> {
    let Some(endpoint) = &settings.otlp_endpoint else {
        return Ok(None);
    };
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;
    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .build();
    global::set_meter_provider(provider.clone());
    info!(%endpoint, "exporting metrics");
    Ok(Some(provider))
}

fn routes(settings: &Settings, store: Arc<dyn CoordinationStore>) -> Router {
    let base = [
        Interceptor::layer(RecoveryLayer::new()),
        Interceptor::layer(AccessLogLayer::new()),
    ];
    let with = |end: Handler, extra: Vec<Interceptor>| -> Handler {
        let interceptors: Vec<Interceptor> = base.iter().cloned().chain(extra).collect();
        chain(end, &interceptors)
    };
    let auth: Interceptor = GuardLayer::bearer(settings.auth_token.clone()).into();

    let fixed = &settings.fixed_window;
    let sliding = &settings.sliding_window;
    let lock = &settings.lock;
    let counter = &settings.page_counter;
    let queue = &settings.handoff;
    let session = &settings.session;
    let cas = &settings.compare_swap;

    Router::new()
        .route_service("/ping", with(handler(service_fn(ping)), vec![]))
        .route_service(
            "/secure",
            with(
                handler(service_fn(secure)),
                vec![
                    auth.clone(),
                    GuardLayer::fixed_window(store.clone(), fixed.limit, fixed.window)
                        .with_fail_policy(fixed.fail_policy)
                        .into(),
                ],
            ),
        )
        .route_service(
            "/sliding",
            with(
                handler(service_fn(secure)),
                vec![
                    auth.clone(),
                    GuardLayer::sliding_window(store.clone(), sliding.limit, sliding.window)
                        .with_fail_policy(sliding.fail_policy)
                        .into(),
                ],
            ),
        )
        .route_service(
            "/order",
            with(
                handler(service_fn(order)),
                vec![
                    auth,
                    GuardLayer::lock(store.clone(), lock.resource.clone(), lock.lease)
                        .with_fail_policy(lock.fail_policy)
                        .into(),
                ],
            ),
        )
        .route_service(
            "/page",
            with(
                handler(service_fn(page)),
                vec![
                    GuardLayer::page_counter(store.clone(), counter.key.clone(), counter.ttl)
                        .with_fail_policy(counter.fail_policy)
                        .into(),
                ],
            ),
        )
        .route_service(
            "/process",
            with(
                handler(service_fn(process)),
                vec![
                    GuardLayer::handoff(store.clone(), queue.source.clone(), queue.processing.clone())
                        .with_fail_policy(queue.fail_policy)
                        .into(),
                ],
            ),
        )
        .route_service(
            "/secure2",
            with(
                handler(service_fn(secure_session)),
                vec![
                    GuardLayer::session(store.clone(), session.ttl)
                        .with_fail_policy(session.fail_policy)
                        .into(),
                ],
            ),
        )
        .route_service(
            "/update",
            with(
                handler(service_fn(update)),
                vec![
                    GuardLayer::compare_and_swap(
                        store,
                        cas.key.clone(),
                        cas.expected.clone(),
                        cas.new.clone(),
                    )
                    .with_fail_policy(cas.fail_policy)
                    .into(),
                ],
            ),
        )
}

async fn shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Args::parse().settings()?;
    if settings.auth_token.is_empty() {
        tracing::warn!("no auth token configured, authenticated routes will refuse everything");
    }
    let provider = metrics(&settings)?;
    let store = connect(&settings).await?;
    let app = routes(&settings, store);

    let listener = tokio::net::TcpListener::bind(settings.bind).await?;
    info!(addr = %settings.bind, "listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown())
    .await?;

    if let Some(provider) = provider {
        provider.shutdown()?;
    }
    Ok(())
}
