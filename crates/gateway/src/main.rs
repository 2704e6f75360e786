//! AgentDesk API Gateway
//!
//! HTTP entry point for the chat widget and the dashboard.
//! Handles:
//! - Chat completion
//! - Knowledge-base ingestion and multi-page crawling
//! - Rate limiting
//! - Observability (logging, metrics, request ids)

mod extract;
mod handlers;
mod middleware;
mod state;

use agentdesk_chat::OpenAiChatModel;
use agentdesk_common::{
    blob,
    config::{AppConfig, ObservabilityConfig},
    db::DbPool,
    metrics::{self, CHAT_LATENCY_BUCKETS, INGESTION_BUCKETS},
    Repository, RetryPolicy,
};
use agentdesk_ingestion::HttpFetcher;
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder};
use state::{AppState, Services};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::Notify};
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    init_tracing(&config.observability);
    info!("Starting AgentDesk API Gateway v{}", agentdesk_common::VERSION);

    // Initialize metrics
    install_metrics_exporter(config.observability.metrics_port)?;
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    if config.database.run_migrations {
        db.migrate().await?;
    }

    let repository = Arc::new(Repository::new(db.clone()));
    let retry = RetryPolicy::from_config(&config.retry);

    let services = Services {
        agents: repository.clone(),
        knowledge: repository.clone(),
        conversations: repository.clone(),
        analytics: repository,
        blobs: blob::from_config(
            &config.storage,
            Duration::from_secs(config.ingestion.fetch_timeout_secs),
        )?,
        fetcher: Arc::new(HttpFetcher::new(&config.ingestion, retry.clone())?),
        model: Arc::new(OpenAiChatModel::new(&config.llm, retry)?),
    };

    // Create app state
    let state = AppState::new(config.clone(), Some(db), services);

    // Build the router
    let app = create_router(state);

    // Start the server
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    info!("Listening on {}", listener.local_addr()?);

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move {
                shutdown_signal().await;
                shutdown.notify_one();
            }
        })
        .into_future();

    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    tokio::select! {
        result = server => result?,
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(drain_timeout).await;
        } => warn!("In-flight requests did not finish before the shutdown timeout"),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Serve Prometheus metrics on their own port; 0 disables the exporter
fn install_metrics_exporter(port: u16) -> Result<(), BuildError> {
    if port == 0 {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Suffix("chat_duration_seconds".to_string()),
            CHAT_LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Suffix("ingestion_duration_seconds".to_string()),
            INGESTION_BUCKETS,
        )?
        .install()?;

    info!(port, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let max_concurrent = state.config.server.max_concurrent_requests.max(1);

    // CORS configuration (the widget is embedded on arbitrary sites)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Pipeline routes
    let mut api_routes = Router::new()
        .route("/chat-completion", post(handlers::chat::chat_completion))
        .route("/scrape-website", post(handlers::ingest::scrape_website))
        .route("/process-document", post(handlers::ingest::process_document))
        .route("/process-text", post(handlers::ingest::process_text))
        .route("/web-scraper", post(handlers::crawl::web_scraper));

    if state.config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(&state.config.rate_limit);
        api_routes = api_routes.route_layer(axum::middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit::rate_limit,
        ));
    }

    // Health endpoints
    let health_routes = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready));

    // Compose the app
    Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                ))
                .layer(ConcurrencyLimitLayer::new(max_concurrent)),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Outermost: assign the id first, copy it onto the response last
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
