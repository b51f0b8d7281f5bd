// Main entry point - Dependency injection and server setup
use std::{net::SocketAddr, sync::Arc};
use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use channel_plotter::application::query_provider::ProviderRegistry;
use channel_plotter::infrastructure::config::load_config;
use channel_plotter::infrastructure::http_provider::HttpQueryProvider;
use channel_plotter::presentation::app_state::AppState;
use channel_plotter::presentation::handlers::{
    channel_state, export, health_check, list_backends, plot, plot_channel, plot_stream,
    search_channels,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (RUST_LOG overrides the default filter)
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    // Load configuration
    let config = load_config()?;

    // Register one provider per configured query API (infrastructure layer)
    let mut registry = ProviderRegistry::new();
    for settings in &config.providers {
        let provider = Arc::new(HttpQueryProvider::new(settings)?);
        match registry.register_discovered(provider, settings.backends.clone()).await {
            Ok(count) => tracing::info!("{} serves {} backends", settings.url, count),
            Err(e) => tracing::error!("Could not list backends of {}: {}", settings.url, e),
        }
    }
    if registry.backends().is_empty() {
        tracing::warn!("No backends registered; every channel lookup will fail");
    }

    // Create application state
    let state = Arc::new(AppState::new(
        Arc::new(registry),
        config.acquisition.bin_count,
        config.export.max_rows,
    ));

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/backends", get(list_backends))
        .route("/search", get(search_channels))
        .route("/channel-state", get(channel_state))
        .route("/channel/:backend/*name", get(plot_channel))
        .route("/plot", get(plot))
        .route("/plot/stream", get(plot_stream))
        .route("/export", get(export))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = config.server.bind.parse()?;
    tracing::info!("Starting channel-plotter on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
