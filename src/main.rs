//! One-Shield IDS Server
//!
//! Suricata alert pipeline with automated IP containment.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ONE-SHIELD IDS                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌───────────┐  ┌─────────────────────────┐ │
//! │  │ eve.json  │─▶│  Noise    │─▶│  Active Response        │ │
//! │  │ Tailer    │  │  Filter   │  │  (iptables)             │ │
//! │  └─────┬─────┘  └───────────┘  └────────────┬────────────┘ │
//! │        └──────────────┬──────────────────────┘              │
//! │                       ▼                                     │
//! │  ┌───────────┐  ┌─────────────┐  ┌───────────────────────┐ │
//! │  │  API      │─▶│   SQLite    │◀─│  Enrichment (lazy)    │ │
//! │  │  (Axum)   │  └─────────────┘  │  AbuseIPDB / ATT&CK   │ │
//! │  └───────────┘                   └───────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod models;
mod handlers;
mod logic;
mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, patch},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logic::external_intel::{AlertEnricher, ThreatIntelClient};
use logic::monitor::{AlertIngestor, LogTailer};
use logic::response::{network, ActiveResponse, Notifier, TelegramNotifier};
use logic::threat::NoiseFilter;

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging first so configuration warnings are visible
    init_tracing(config::json_logs_from_env());

    // Load configuration
    let config = config::Config::from_env();

    tracing::info!("One-Shield IDS starting ({})...", config.environment);
    tracing::info!("Database: {}", config.database_url);

    // Initialize database pool
    let pool = db::create_pool(&config.database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool)
        .await
        .context("Failed to run migrations")?;

    // Services
    let noise = Arc::new(NoiseFilter::new(&config.noise));

    let firewall = network::from_config(&config.response);
    tracing::info!(
        "Active response {} (firewall: {}, threshold: severity <= {})",
        if config.response.enabled { "enabled" } else { "disabled" },
        firewall.name(),
        config.response.block_severity_threshold
    );
    let response = Arc::new(ActiveResponse::new(pool.clone(), Arc::from(firewall), &config.response));

    let intel = Arc::new(ThreatIntelClient::from_config(&config.intel));
    let enricher = Arc::new(AlertEnricher::new(
        pool.clone(),
        intel,
        config.intel.enrichment_stale_secs,
    ));

    let notifier: Option<Arc<dyn Notifier>> = match TelegramNotifier::from_config(&config.notify) {
        Some(telegram) => Some(Arc::new(telegram) as Arc<dyn Notifier>),
        None => {
            tracing::info!("Telegram credentials not set, notifications disabled");
            None
        }
    };

    // Background ingestion
    let ingestor = Arc::new(AlertIngestor::new(
        pool.clone(),
        noise.clone(),
        response.clone(),
        notifier,
    ));
    let tailer = LogTailer::from_config(&config.monitor).start(ingestor);

    // Build application state
    let state = AppState {
        pool,
        config: config.clone(),
        noise,
        response,
        enricher,
    };

    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(tailer) = tailer {
        if !tailer.is_running() {
            tracing::warn!("Log tailer had already stopped before shutdown");
        }
        tailer.shutdown().await;
    }
    tracing::info!("One-Shield IDS stopped");

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "oneshield_ids=info,tower_http=info".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::SqlitePool,
    pub config: config::Config,
    pub noise: Arc<NoiseFilter>,
    pub response: Arc<ActiveResponse>,
    pub enricher: Arc<AlertEnricher>,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::check))

        // Alerts
        .route("/api/v1/alerts", get(handlers::alerts::list))
        .route("/api/v1/alerts/:id", get(handlers::alerts::get))
        .route("/api/v1/alerts/:id/related", get(handlers::alerts::related))
        .route("/api/v1/alerts/:id/status", patch(handlers::alerts::update_status))

        // Statistics
        .route("/api/v1/stats", get(handlers::stats::overview))
        .route("/api/v1/stats/noise", get(handlers::stats::noise))

        // Block registry
        .route("/api/v1/blocks", get(handlers::blocks::list).post(handlers::blocks::create))
        .route("/api/v1/blocks/:ip", axum::routing::delete(handlers::blocks::delete))
        .route("/api/v1/blocks/:ip/history", get(handlers::blocks::history))

        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
