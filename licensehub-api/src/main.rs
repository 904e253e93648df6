//! # LicenseHub API Server
//!
//! Validates license keys against our own database and the two reseller
//! APIs, and merges a user's individual licenses into teams.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p licensehub-api
//! ```

use licensehub_api::{
    app::{build_router, AppState},
    config::{Config, LogFormat},
};
use licensehub_shared::db::{
    migrations::run_migrations,
    pool::{create_pool, DatabaseConfig},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        "LicenseHub API Server v{} starting...",
        env!("CARGO_PKG_VERSION")
    );

    if config.vendors.lemonsqueezy.store_id.is_empty() {
        tracing::warn!("LEMONSQUEEZY_STORE_ID is not set; LemonSqueezy keys will not validate");
    }
    if config.vendors.appsumo.api_key.is_empty() {
        tracing::warn!("APPSUMO_API_KEY is not set; AppSumo keys will not validate");
    }

    let pool = create_pool(DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        ..DatabaseConfig::default()
    })
    .await?;
    run_migrations(&pool).await?;

    let bind_address = config.bind_address();
    let state = AppState::new(pool, config)?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "licensehub_api=debug,licensehub_shared=debug,tower_http=debug".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}
