mod app_state;
mod assembler;
mod broker;
mod config;
mod dispatch;
mod error;
mod file_locator;
mod handlers;
mod listener;
mod models;
mod status_cache;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use stderrlog::Timestamp;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use app_state::AppState;
use broker::BrokerClient;
use config::Config;
use dispatch::DispatchService;
use file_locator::DeterministicFileLocator;
use listener::ResponseListener;
use status_cache::WorkerStatusCache;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("FATAL ERROR: {}", e);
        eprintln!("Error details: {:?}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    stderrlog::new()
        .verbosity(log::Level::Info)
        .timestamp(Timestamp::Millisecond)
        .show_module_names(true)
        .init()
        .unwrap();

    log::info!("=== Judge Control Plane Starting ===");
    log::info!("Process ID: {}", std::process::id());

    match dotenvy::dotenv() {
        Ok(_) => log::info!("Environment variables loaded from .env file"),
        Err(_) => log::info!("No .env file found, using system environment variables"),
    }

    let config = Config::load();
    log::info!("Configuration loaded: db={}:{}/{}, port={}", config.db_host, config.db_port, config.db_name, config.port);

    let pool = store::create_pool(&config).await?;
    store::schema::initialize_schema(&pool).await?;

    let cancellation = CancellationToken::new();

    let broker = BrokerClient::new(
        config.broker_url(),
        config.broker_worker_queue_name.clone(),
        config.broker_response_queue_name.clone(),
    );
    broker.start(cancellation.clone());

    let file_locator = Arc::new(DeterministicFileLocator {
        server_type: "s3".to_string(),
        bucket: "judge-results".to_string(),
    });

    let dispatch_service = Arc::new(DispatchService::new(
        pool.clone(),
        Arc::clone(&broker),
        Arc::clone(&file_locator),
        config.broker_worker_queue_name.clone(),
        config.broker_response_queue_name.clone(),
    ));

    let status_cache = WorkerStatusCache::new();

    let listener_service = ResponseListener::new(
        pool.clone(),
        Arc::clone(&broker),
        config.broker_response_queue_name.clone(),
        status_cache.clone(),
        Arc::clone(&file_locator),
    );
    listener_service.start(Arc::clone(&dispatch_service), cancellation.clone());

    spawn_status_probe(Arc::clone(&dispatch_service), config.status_probe_interval_secs, cancellation.clone());

    let state = AppState {
        pool,
        broker: Arc::clone(&broker),
        dispatch: dispatch_service,
        status_cache,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/submissions/:id/dispatch", post(handlers::dispatch::dispatch_submission))
        .route("/worker-status", get(handlers::worker_status::get_worker_status))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    log::info!("Binding to address: {}", addr);
    let tcp_listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("=== Judge Control Plane Ready ===");

    axum::serve(tcp_listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancellation.cancel();
    broker.shutdown().await;
    log::info!("Server shutdown complete");
    Ok(())
}

/// Keeps the worker status cache warm even without inbound HTTP demand.
fn spawn_status_probe(dispatch: Arc<DispatchService>, interval_secs: u64, cancellation: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    dispatch.publish_status_request().await;
                }
                _ = cancellation.cancelled() => {
                    log::info!("status probe loop cancelled");
                    break;
                }
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            log::info!("received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            log::info!("received terminate signal, shutting down gracefully...");
        }
    }
}
