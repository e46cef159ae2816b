use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::credentials::activation::ActivationResponse;
use crate::error::GatewayResult;
use crate::health::reporter::HealthStatus;
use crate::server::server::AppState;
use crate::upstream::client::UpstreamRequest;

#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    pub refresh_token: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api", get(api_index))
        .route("/health", get(health))
        .route("/activation/status", get(activation_status))
        .route("/activation/start", post(activation_start))
        .route("/activation/complete", post(activation_complete))
        .route("/activation/reset", post(activation_reset))
        .route("/activation/bootstrap", post(activation_bootstrap))
        .route("/api/upstream/{*path}", get(upstream_passthrough))
}

async fn api_index() -> Json<Value> {
    Json(json!({
        "message": "Thermostat gateway",
        "endpoints": {
            "/": "Web UI for device activation",
            "/activation/status": "Get activation status",
            "/activation/start": "Start device activation (get URL)",
            "/activation/complete": "Complete activation after user authenticates",
            "/activation/reset": "Forget the stored credential",
            "/activation/bootstrap": "Seed the gateway with an existing refresh token",
            "/api/upstream/{path}": "Authenticated passthrough to the vendor API",
            "/health": "Health check",
        }
    }))
}

async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.health.check().await)
}

async fn activation_status(State(state): State<AppState>) -> Json<ActivationResponse> {
    Json(state.activation.status().await)
}

async fn activation_start(State(state): State<AppState>) -> GatewayResult<Json<ActivationResponse>> {
    state.activation.start().await.map(Json)
}

async fn activation_complete(State(state): State<AppState>) -> GatewayResult<Json<ActivationResponse>> {
    state.activation.complete().await.map(Json)
}

async fn activation_reset(State(state): State<AppState>) -> GatewayResult<Json<ActivationResponse>> {
    state.activation.reset().await.map(Json)
}

async fn activation_bootstrap(
    State(state): State<AppState>,
    Json(request): Json<BootstrapRequest>,
) -> GatewayResult<Json<Value>> {
    state.credentials.bootstrap(&request.refresh_token).await?;
    info!("gateway bootstrapped through HTTP");
    Ok(Json(json!({
        "status": "bootstrapped",
        "message": "Refresh token stored, access token will be obtained on first use",
    })))
}

async fn upstream_passthrough(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
) -> GatewayResult<Response> {
    let response = state
        .upstream
        .call(&UpstreamRequest::get(path).with_query(query))
        .await?;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    Ok((status, Json(response.body)).into_response())
}
