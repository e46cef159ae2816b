use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::settings::AuthConfig;
use crate::credentials::credential::TokenGrant;
use crate::error::{GatewayError, GatewayResult};
use crate::resilience::retry::RetrySettings;
use crate::utils::constants::{GRANT_DEVICE_CODE, GRANT_REFRESH_TOKEN};

/// OAuth error codes meaning the refresh token (or client) will never be accepted again.
const PERMANENT_REJECTIONS: [&str; 3] = ["invalid_grant", "invalid_client", "unauthorized_client"];

#[derive(Debug, Clone, Deserialize, Default)]
pub struct OAuthErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    fn reason(&self) -> String {
        match &self.error_description {
            Some(description) => format!("{}: {}", self.error, description),
            None => self.error.clone(),
        }
    }
}

/// RFC 8628 device authorization response.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorization {
    pub device_code: String,
    #[serde(default)]
    pub user_code: Option<String>,
    pub verification_uri: String,
    #[serde(default)]
    pub verification_uri_complete: Option<String>,
    pub expires_in: u64,
    #[serde(default = "default_poll_interval")]
    pub interval: u64,
}

fn default_poll_interval() -> u64 {
    5
}

#[derive(Debug)]
pub enum DevicePoll {
    Granted(TokenGrant),
    Pending,
    SlowDown,
    Denied(String),
}

enum TokenResponse {
    Granted(TokenGrant),
    Rejected { status: StatusCode, body: OAuthErrorBody },
}

/// Client for the upstream authorization server.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    config: Arc<AuthConfig>,
    retry: RetrySettings,
}

impl AuthClient {
    pub fn new(client: Client, config: AuthConfig, retry: RetrySettings) -> Self {
        Self { client, config: Arc::new(config), retry }
    }

    /// `grant_type=refresh_token`. Transport failures are retried, rejections are not.
    pub async fn refresh(&self, refresh_token: &str) -> GatewayResult<TokenGrant> {
        let form = [
            ("grant_type", GRANT_REFRESH_TOKEN),
            ("client_id", self.config.client_id.as_str()),
            ("refresh_token", refresh_token),
        ];
        let response = self
            .retry
            .run_with_retry(|| self.send_token_request(&form), GatewayError::is_transient)
            .await?;

        match response {
            TokenResponse::Granted(grant) => Ok(grant),
            TokenResponse::Rejected { status, body } => Err(classify_refresh_rejection(status, body)),
        }
    }

    pub async fn request_device_code(&self) -> GatewayResult<DeviceAuthorization> {
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", self.config.scope.as_str()),
        ];
        let (status, text) = self
            .retry
            .run_with_retry(|| self.send_device_request(&form), GatewayError::is_transient)
            .await?;

        if !status.is_success() {
            return Err(GatewayError::Upstream { status: status.as_u16(), body: json_or_text(&text) });
        }
        serde_json::from_str(&text).map_err(|e| {
            GatewayError::Activation(format!("malformed device authorization response: {}", e))
        })
    }

    async fn send_device_request(&self, form: &[(&str, &str)]) -> GatewayResult<(StatusCode, String)> {
        let response = self.client.post(&self.config.device_authorize_url).form(form).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("device authorization responded {}", status)));
        }
        Ok((status, text))
    }

    /// One poll of the token endpoint with the device code.
    pub async fn poll_device_token(&self, device_code: &str) -> GatewayResult<DevicePoll> {
        let form = [
            ("grant_type", GRANT_DEVICE_CODE),
            ("client_id", self.config.client_id.as_str()),
            ("device_code", device_code),
        ];
        match self.send_token_request(&form).await? {
            TokenResponse::Granted(grant) => Ok(DevicePoll::Granted(grant)),
            TokenResponse::Rejected { body, .. } => Ok(match body.error.as_str() {
                "authorization_pending" => DevicePoll::Pending,
                "slow_down" => DevicePoll::SlowDown,
                _ => DevicePoll::Denied(body.reason()),
            }),
        }
    }

    async fn send_token_request(&self, form: &[(&str, &str)]) -> GatewayResult<TokenResponse> {
        let response = self.client.post(&self.config.token_url).form(form).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!("token endpoint responded {}", status);

        if status.is_success() {
            return serde_json::from_str::<TokenGrant>(&text)
                .map(TokenResponse::Granted)
                .map_err(|e| GatewayError::Upstream {
                    status: status.as_u16(),
                    body: Value::String(format!("malformed token response: {}", e)),
                });
        }
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::Unavailable(format!("token endpoint responded {}", status)));
        }
        match serde_json::from_str::<OAuthErrorBody>(&text) {
            Ok(body) => Ok(TokenResponse::Rejected { status, body }),
            Err(_) => Ok(TokenResponse::Rejected {
                status,
                body: OAuthErrorBody { error: text, error_description: None },
            }),
        }
    }
}

fn classify_refresh_rejection(status: StatusCode, body: OAuthErrorBody) -> GatewayError {
    if status == StatusCode::UNAUTHORIZED || PERMANENT_REJECTIONS.contains(&body.error.as_str()) {
        warn!("refresh token rejected by authorization server: {}", body.error);
        GatewayError::AuthRejected(body.reason())
    } else {
        GatewayError::Upstream {
            status: status.as_u16(),
            body: serde_json::json!({ "error": body.error, "error_description": body.error_description }),
        }
    }
}

pub(crate) fn json_or_text(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}
