//! InvoiceFlow API Gateway
//!
//! The entry point for invoice uploads and status queries.
//! Handles:
//! - Multipart PDF upload, blob storage, and job dispatch
//! - Invoice listing and business status updates
//! - Retry of failed extractions
//! - Observability (logging, metrics, tracing)

mod handlers;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Router,
};
use invoiceflow_common::{
    config::AppConfig,
    db::DbPool,
    metrics,
    queue::{Queue, QueueConfig},
    storage::{BlobStore, FsBlobStore},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub store: Arc<dyn BlobStore>,
    /// Extraction job queue; uploads are accepted without it but stay
    /// pending until a queue is configured
    pub queue: Option<Arc<Queue>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting InvoiceFlow API Gateway v{}", invoiceflow_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;

    // Blob store for uploaded PDFs
    let store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(config.storage.root.clone()));

    // Extraction queue
    let queue = match config.queue.extraction_queue_url.clone() {
        Some(url) => {
            info!(url = %url, "Connecting to extraction queue...");
            let queue_config = QueueConfig {
                url,
                dlq_url: config.queue.dlq_url.clone(),
                ..Default::default()
            };
            Some(Arc::new(Queue::new(queue_config).await?))
        }
        None => {
            warn!("queue.extraction_queue_url not set, uploads will not be dispatched");
            None
        }
    };

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        store,
        queue,
    };

    // Build the router
    let app = create_router(state, config.server.max_upload_bytes);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Invoice endpoints
        .route("/invoices", get(handlers::invoices::list_invoices))
        .route("/invoices", post(handlers::invoices::upload_invoice))
        .route("/invoices/{id}", get(handlers::invoices::get_invoice))
        .route("/invoices/{id}", patch(handlers::invoices::update_invoice_status))
        .route("/invoices/{id}/retry", post(handlers::invoices::retry_invoice));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
