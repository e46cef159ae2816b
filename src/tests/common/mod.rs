// src/tests/common/mod.rs
pub use axum::Router;
pub use serde_json::json;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Client;
use tempfile::TempDir;

use crate::config::settings::{ServiceConfig, RetryConfig};
use crate::credentials::auth_client::AuthClient;
use crate::credentials::manager::CredentialManager;
use crate::credentials::token_store::TokenStore;
use crate::resilience::retry::RetrySettings;
use crate::upstream::client::UpstreamClient;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Config pointing auth at `auth_base` and the vendor API at `upstream_base`,
/// with the token file inside `dir` and millisecond backoff.
pub fn test_config(dir: &TempDir, auth_base: &str, upstream_base: &str) -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.token.path = dir.path().join("data").join("refresh_token").display().to_string();
    config.auth.token_url = format!("{}/token", auth_base);
    config.auth.device_authorize_url = format!("{}/device_authorize", auth_base);
    config.auth.client_id = "test-client".to_owned();
    config.upstream.base_url = upstream_base.to_owned();
    config.upstream.request_timeout_ms = 2_000;
    config.settings.retry = RetryConfig { attempts: 3, base_delay_ms: 5, max_delay_ms: 20 };
    config.activation.poll_attempts = 5;
    config.activation.min_poll_interval_ms = 10;
    config.server.static_dir = dir.path().join("static").display().to_string();
    config
}

pub async fn build_manager(config: &ServiceConfig) -> CredentialManager {
    let auth = AuthClient::new(
        build_reqwest_client(),
        config.auth.clone(),
        RetrySettings::from(&config.settings.retry),
    );
    CredentialManager::new(
        TokenStore::new(&config.token.path),
        auth,
        config.settings.safety_margin_seconds,
    )
    .await
}

pub fn build_upstream(config: &ServiceConfig, manager: &CredentialManager) -> UpstreamClient {
    UpstreamClient::new(
        build_reqwest_client(),
        &config.upstream.base_url,
        manager.clone(),
        RetrySettings::from(&config.settings.retry),
    )
}

pub fn grant_body(access_token: &str, refresh_token: Option<&str>, expires_in: u64) -> String {
    let mut body = json!({
        "access_token": access_token,
        "token_type": "bearer",
        "expires_in": expires_in,
    });
    if let Some(rt) = refresh_token {
        body["refresh_token"] = json!(rt);
    }
    body.to_string()
}

pub fn read_token_file(config: &ServiceConfig) -> Option<String> {
    std::fs::read_to_string(&config.token.path).ok()
}
