use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beacon::api::{create_api_router, AppState};
use beacon::clock::{Clock, SystemClock};
use beacon::config::{Config, TrustedProxyMode};
use beacon::storage::{build_store, ExpirySweeper};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("beacon=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!("Loaded configuration");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::with_offset_minutes(config.day_offset_minutes));

    // Initialize storage
    let store = build_store(&config.store, Arc::clone(&clock)).await?;
    info!("Initializing store...");
    store.init().await?;
    info!("Store initialized successfully");

    let sweeper = ExpirySweeper::spawn(
        Arc::clone(&store),
        Duration::from_secs(config.store.sweep_interval_secs.max(1)),
    );

    match config.proxy.mode {
        TrustedProxyMode::Cloudflare => info!("Client address from CF-Connecting-IP"),
        TrustedProxyMode::Standard => info!(
            trusted = config.proxy.trusted_proxies.len(),
            hops = ?config.proxy.num_trusted_proxies,
            "Client address from Forwarded / X-Forwarded-For"
        ),
        TrustedProxyMode::None => info!("Client address from socket only"),
    }
    match config.cors.allowed_origin.as_deref() {
        Some(origin) => info!("CORS allowed origin: {}", origin),
        None => info!("CORS disabled (ALLOWED_ORIGIN not set)"),
    }

    let state = Arc::new(AppState::new(Arc::clone(&store), clock, &config));
    let router = create_api_router(state, &config.cors);

    let addr = format!("{}:{}", config.api_server.host, config.api_server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("🚀 Beacon server listening on http://{}", addr);
    info!("   - POST http://{}/api/track", addr);
    info!("   - GET  http://{}/api/stats", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down...");
    sweeper.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
