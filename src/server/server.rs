use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use reqwest::Client;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::settings::ServiceConfig;
use crate::credentials::activation::DeviceActivation;
use crate::credentials::auth_client::AuthClient;
use crate::credentials::manager::CredentialManager;
use crate::credentials::token_store::TokenStore;
use crate::health::reporter::HealthReporter;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;
use crate::resilience::retry::RetrySettings;
use crate::server::routes;
use crate::upstream::client::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub metrics_state: MetricsState,
    pub credentials: CredentialManager,
    pub upstream: UpstreamClient,
    pub health: HealthReporter,
    pub activation: Arc<DeviceActivation>,
}

impl AppState {
    /// Wire token store, auth client, credential manager and upstream client from config.
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.upstream.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        let retry = RetrySettings::from(&config.settings.retry);

        let store = TokenStore::new(&config.token.path);
        let auth = AuthClient::new(client.clone(), config.auth.clone(), retry.clone());
        let credentials = CredentialManager::new(store, auth, config.settings.safety_margin_seconds).await;
        let upstream = UpstreamClient::new(client, &config.upstream.base_url, credentials.clone(), retry);
        let metrics = get_metrics().await;

        Ok(Self {
            metrics_state: MetricsState::new(metrics.registry.clone()),
            health: HealthReporter::new(credentials.clone()),
            activation: Arc::new(DeviceActivation::new(credentials.clone(), config.activation.clone())),
            credentials,
            upstream,
        })
    }
}

/// API, activation, health, metrics and static assets on one router.
pub fn build_router(config: &ServiceConfig, state: AppState) -> Router {
    let static_dir = Path::new(&config.server.static_dir);
    let index = ServeFile::new(static_dir.join("index.html"));

    Router::new()
        .merge(routes::router())
        .merge(state.metrics_state.router(&config.metrics))
        .route_service("/", index)
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until SIGINT/SIGTERM. Bind failure is fatal for the process.
pub async fn start(config: &ServiceConfig, state: AppState) -> Result<()> {
    let app = build_router(config, state);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    let metrics = get_metrics().await;
    metrics.up.set(1);
    info!("listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    metrics.up.set(0);
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let (mut sigint, mut sigterm) = match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
        (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
        _ => {
            warn!("signal handlers unavailable, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    select! {
        _ = sigint.recv() => info!("Received SIGINT (Ctrl+C). Initiating graceful shutdown..."),
        _ = sigterm.recv() => info!("Received SIGTERM. Initiating graceful shutdown..."),
    }
}
