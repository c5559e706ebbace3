//! Order book synchronizer service
//!
//! Connects to the order book feed, keeps the local book in sync and serves
//! the current projection over HTTP (and optionally over IPC).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orderbook_sync::{
    AppState, BookView, Config, FeedConnection, FeedMetrics, OrderBookSynchronizer, Publisher,
    TungsteniteConnector,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting order book synchronizer");

    let config = Arc::new(Config::load()?);
    info!(
        endpoint = %config.ws_endpoint,
        topic = %config.topic,
        max_levels = config.max_levels,
        "Configuration loaded"
    );

    let metrics = FeedMetrics::new()?;
    metrics.register(prometheus::default_registry())?;

    let (feed, frames, feed_task) =
        FeedConnection::spawn(TungsteniteConnector, config.feed_settings(), metrics.clone());

    let synchronizer = OrderBookSynchronizer::new(feed.clone(), config.book_settings(), metrics);
    let sync = synchronizer.spawn(frames);
    sync.connect();

    if let Some(path) = config.ipc_socket_path.as_deref() {
        let publisher = Publisher::new(path).await;
        tokio::spawn(publisher.run(sync.subscribe()));
    }

    let state = Arc::new(AppState {
        view: sync.subscribe(),
        feed: feed.clone(),
        config: config.clone(),
    });

    let http_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = start_http_server(http_state).await {
            warn!(error = %e, "HTTP server error");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    sync.shutdown().await;
    feed.shutdown();
    if let Err(e) = feed_task.await {
        warn!(error = %e, "Feed connection task failed");
    }

    info!("Order book synchronizer stopped");
    Ok(())
}

/// HTTP server for health checks, metrics and the current projection
async fn start_http_server(state: Arc<AppState>) -> anyhow::Result<()> {
    let addr: SocketAddr = state.config.http_addr.parse()?;

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/book", get(book))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let initialized = state.view.borrow().is_initialized;
    Json(serde_json::json!({
        "status": "healthy",
        "component": "orderbook-sync",
        "symbol": state.config.symbol,
        "connection": state.feed.state(),
        "reconnectAttempts": state.feed.reconnect_attempts(),
        "initialized": initialized,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn book(State(state): State<Arc<AppState>>) -> Json<BookView> {
    Json(state.view.borrow().clone())
}

async fn metrics() -> impl IntoResponse {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    match encoder.encode(&prometheus::gather(), &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            buffer,
        ),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                Vec::new(),
            )
        }
    }
}
