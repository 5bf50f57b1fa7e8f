//! askroute API Gateway
//!
//! The entry point for all external API requests.
//! Handles:
//! - Chat turns through the query-routing orchestrator
//! - Document upload and listing
//! - Rate limiting, timeouts and request ids
//! - Observability (logging, metrics)

mod handlers;
mod middleware;
mod sessions;

use askroute_common::{
    agent::{Collaborators, Orchestrator, SimilarityStore, TurnSettings},
    config::AppConfig,
    embeddings, llm::ChatClient, metrics, store, websearch::TavilyClient,
};
use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use sessions::SessionLog;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn SimilarityStore>,
    pub sessions: Arc<SessionLog>,
    pub metrics: Option<PrometheusHandle>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config);
    info!("Starting askroute API Gateway v{}", askroute_common::VERSION);

    // Initialize metrics
    let metrics_handle = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .set_buckets(metrics::LATENCY_BUCKETS)?
            .install_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    let state = build_state(config.clone(), metrics_handle).await?;
    let app = create_router(state);

    // Start the server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

/// Wire the providers, store and orchestrator from configuration
async fn build_state(
    config: Arc<AppConfig>,
    metrics: Option<PrometheusHandle>,
) -> anyhow::Result<AppState> {
    let embedder = embeddings::create_embedder(&config.embedding)?;
    let store = store::build_store(&config, embedder).await?;

    let (classifier, judge, generator) = ChatClient::for_roles(&config.llm)?;
    let search = TavilyClient::new(&config.web_search)?;

    let orchestrator = Orchestrator::new(
        Collaborators {
            classifier: Arc::new(classifier),
            judge: Arc::new(judge),
            generator: Arc::new(generator),
            store: store.clone(),
            search: Arc::new(search),
        },
        TurnSettings::from(config.as_ref()),
    );

    let sessions = Arc::new(SessionLog::new(
        config.server.max_sessions,
        config.server.max_session_messages,
    ));

    Ok(AppState {
        config,
        orchestrator: Arc::new(orchestrator),
        store,
        sessions,
        metrics,
    })
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let max_upload_bytes = state.config.server.max_upload_bytes;
    let max_concurrent = state.config.server.max_concurrent_requests.max(1);
    let request_timeout = state.config.request_timeout();
    let rate_limit = state.config.rate_limit.clone();

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Query turns
        .route("/chat", post(handlers::chat::chat))

        // Documents
        .route("/documents", get(handlers::documents::list_documents))
        .route("/upload-document", post(handlers::documents::upload_document))

        // Session log
        .route("/sessions/{id}", get(handlers::sessions::get_session));

    let mut app = Router::new()
        .nest("/v1", api_routes)
        .route("/metrics", get(handlers::health::metrics))
        .layer(from_fn(middleware::metrics::track_requests));

    if rate_limit.enabled {
        match middleware::rate_limit::create_rate_limiter(rate_limit.requests_per_second, rate_limit.burst) {
            Some(limiter) => {
                app = app.layer(from_fn_with_state(limiter, middleware::rate_limit::rate_limit));
            }
            None => warn!("Rate limit quota must be non-zero, rate limiting disabled"),
        }
    }

    // Compose the app
    app.layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(ConcurrencyLimitLayer::new(max_concurrent))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests;
