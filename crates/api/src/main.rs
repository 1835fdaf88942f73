use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use skyguard_api::config::ServerConfig;
use skyguard_api::{routes, state, ws};
use skyguard_db::catalog::{MemoryCatalog, PgCatalog, VideoCatalog};
use skyguard_pipeline::inference::{
    Classifier, Detector, HttpClassifier, HttpDetector, StaticClassifier, StaticDetector,
};

use state::AppState;

/// Top-k classifications requested from the remote classifier.
const CLASSIFIER_TOP_K: usize = 5;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "skyguard_api=debug,skyguard_pipeline=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Durable catalog ---
    // The record store is an external collaborator: Postgres when
    // DATABASE_URL is configured, in-process otherwise.
    let catalog: Arc<dyn VideoCatalog> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = skyguard_db::create_pool(&database_url)
                .await
                .expect("Failed to connect to database");
            skyguard_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            skyguard_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Postgres catalog ready");
            Arc::new(PgCatalog::new(pool))
        }
        Err(_) => {
            tracing::warn!("DATABASE_URL not set, using in-memory catalog");
            Arc::new(MemoryCatalog::new())
        }
    };

    // --- Inference capabilities ---
    // Constructed once and injected everywhere; no process-wide defaults.
    let (detector, classifier): (Arc<dyn Detector>, Arc<dyn Classifier>) =
        match &config.inference_endpoint {
            Some(endpoint) => {
                let client = reqwest::Client::new();
                tracing::info!(endpoint = %endpoint, "Using remote inference backends");
                (
                    Arc::new(HttpDetector::new(client.clone(), endpoint.clone())),
                    Arc::new(HttpClassifier::new(client, endpoint.clone(), CLASSIFIER_TOP_K)),
                )
            }
            None => {
                tracing::warn!("INFERENCE_ENDPOINT not set, using static inference backends");
                (
                    Arc::new(StaticDetector::surveillance_defaults()),
                    Arc::new(StaticClassifier::surveillance_defaults()),
                )
            }
        };

    // --- CORS ---
    let cors = build_cors_layer(&config);
    let request_timeout_secs = config.request_timeout_secs;
    let shutdown_timeout_secs = config.shutdown_timeout_secs;
    let max_upload_bytes = config.max_upload_bytes;

    // --- App state ---
    let state = AppState::new(config.clone(), catalog, detector, classifier);
    let ws_manager = Arc::clone(&state.ws_manager);
    let registry = Arc::clone(&state.registry);

    // --- Heartbeat ---
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- Request ID header name ---
    let request_id_header = HeaderName::from_static("x-request-id");

    // --- Router ---
    let app = Router::new()
        // Health check at root level (not under /api/v1).
        .merge(routes::health::router())
        // Push sessions at root level per the streaming contract.
        .merge(routes::ws_routes())
        // API v1 routes.
        .nest("/api/v1", routes::api_routes(max_upload_bytes))
        // -- Middleware stack (applied bottom-up) --
        // Panic recovery: catch panics and return 500 JSON.
        .layer(CatchPanicLayer::new())
        // Request timeout.
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
        // Propagate request ID to response.
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        // Structured request/response tracing.
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Set request ID on incoming requests.
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        // CORS.
        .layer(cors)
        // Shared state.
        .with_state(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // Let running jobs notice cancellation at their next batch boundary.
    registry
        .shutdown_all(Duration::from_secs(shutdown_timeout_secs))
        .await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Build the CORS middleware layer from server configuration.
///
/// Panics at startup if any configured origin is invalid; misconfiguration
/// should fail fast.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
