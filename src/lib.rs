//! Accounts is a customer and account management service for a banking
//! platform.
#![forbid(unsafe_code)]

pub mod account;
pub mod config;
mod database;
pub mod error;
pub mod gateway;
pub mod messaging;
mod router;
pub mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{Method, StatusCode, header};
use axum::routing::get;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{Any, CorsLayer};
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

use account::{AccountService, MemoryStore, PostgresStore, Store};
use messaging::{AmqpPublisher, Publisher};

const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    token: Option<String>,
    app: Router,
    method: Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    app.oneshot(request.body(axum::body::Body::from(body)).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub accounts: AccountService,
    /// `None` leaves write routes open.
    pub gateway: Option<gateway::TokenVerifier>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(10)))
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
                .allow_headers(Any)
                .vary([header::AUTHORIZATION]),
        );

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        // `GET /metrics` goes to `metrics`.
        .route("/metrics", get(router::status::metrics))
        .nest("/api", router::router(state.clone()))
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
pub async fn initialize_state() -> Result<AppState, Box<dyn std::error::Error>> {
    // read configuration file. let it in memory.
    let mut config = config::Configuration::default();
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        config = config.path(PathBuf::from(path));
    }
    let config = config.read()?;

    let store: Arc<dyn Store> = match config.postgres {
        Some(ref config) => {
            let pool = database::connect(
                &config.address,
                config
                    .username
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .password
                    .as_deref()
                    .unwrap_or(database::DEFAULT_CREDENTIALS),
                config
                    .database
                    .as_deref()
                    .unwrap_or(database::DEFAULT_DATABASE_NAME),
                config.pool_size.unwrap_or(database::DEFAULT_POOL_SIZE),
            )
            .await?;

            Arc::new(PostgresStore::new(pool))
        },
        None => {
            tracing::warn!(
                "missing `postgres` entry on `config.yaml` file, records are kept in memory"
            );
            Arc::new(MemoryStore::new())
        },
    };

    // handle event broker.
    let publisher = match &config.messaging {
        Some(cfg) => Arc::new(AmqpPublisher::new(cfg).await?),
        None => {
            tracing::warn!("missing `messaging` entry on `config.yaml` file, events are dropped");
            Arc::new(AmqpPublisher::default())
        },
    };

    let accounts = AccountService::new(
        store,
        Arc::clone(&publisher) as Arc<dyn Publisher>,
        config.account.clone(),
    );

    if config.messaging.is_some() {
        let service = accounts.clone();
        tokio::spawn(async move {
            if let Err(err) = publisher.consume_status_updates(service).await {
                tracing::error!(error = %err, "communication consumer stopped");
            }
        });
    }

    // handle role verification.
    let gateway = match &config.gateway {
        Some(cfg) => Some(gateway::TokenVerifier::new(cfg)?),
        None => {
            tracing::warn!("missing `gateway` entry on `config.yaml` file, write routes are open");
            None
        },
    };

    let metrics = telemetry::setup_metrics_recorder()?;

    Ok(AppState {
        config,
        accounts,
        gateway,
        metrics: Some(metrics),
    })
}
