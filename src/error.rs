//! Request-scoped failure taxonomy shared by the credential, upstream and activation layers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// `Clone` so that every waiter of a coalesced refresh can receive the same outcome.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No credential is held; only an external (re-)authorization recovers from this.
    #[error("not authorized: no credential available, activation required")]
    Unauthorized,
    /// The authorization server rejected the refresh token.
    #[error("upstream rejected credentials: {0}")]
    AuthRejected(String),
    /// Non-auth failure answered by the vendor API.
    #[error("upstream responded with {status}")]
    Upstream { status: u16, body: Value },
    /// Transport failure or 5xx after retries were exhausted.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
    /// Token file read/write failure.
    #[error("token store I/O failure: {0}")]
    Io(String),
    #[error("activation failed: {0}")]
    Activation(String),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl GatewayError {
    /// Failures the retry policy is allowed to repeat.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Unauthorized => "unauthorized",
            GatewayError::AuthRejected(_) => "auth_rejected",
            GatewayError::Upstream { .. } => "upstream_error",
            GatewayError::Unavailable(_) => "upstream_unavailable",
            GatewayError::Io(_) => "io_error",
            GatewayError::Activation(_) => "activation_error",
            GatewayError::BadRequest(_) => "bad_request",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Unauthorized => StatusCode::UNAUTHORIZED,
            GatewayError::AuthRejected(_) => StatusCode::FORBIDDEN,
            GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Activation(_) => StatusCode::CONFLICT,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Unavailable(err.to_string())
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::Io(err.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        if let GatewayError::Upstream { status, body: upstream_body } = &self {
            body["upstream_status"] = json!(status);
            body["upstream_body"] = upstream_body.clone();
        }
        (self.status_code(), Json(body)).into_response()
    }
}
