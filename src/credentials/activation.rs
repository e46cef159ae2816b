//! Device authorization flow ending in a credential install.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::settings::ActivationConfig;
use crate::credentials::auth_client::{DeviceAuthorization, DevicePoll};
use crate::credentials::manager::CredentialManager;
use crate::error::{GatewayError, GatewayResult};
use crate::helpers::time::{expires_at_from, now};
use crate::observability::metrics::get_metrics;

const SLOW_DOWN_STEP_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    NotStarted,
    Pending,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivationResponse {
    pub status: ActivationState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorized_at: Option<DateTime<Utc>>,
}

impl ActivationResponse {
    fn new(status: ActivationState, message: impl Into<String>) -> Self {
        Self { status, message: message.into(), url: None, user_code: None, authorized_at: None }
    }
}

#[derive(Debug, Clone)]
struct PendingSession {
    device: DeviceAuthorization,
    expires_at: DateTime<Utc>,
}

impl PendingSession {
    fn is_expired(&self) -> bool {
        now() >= self.expires_at
    }

    fn url(&self) -> String {
        self.device
            .verification_uri_complete
            .clone()
            .unwrap_or_else(|| self.device.verification_uri.clone())
    }

    fn is_same(&self, other: Option<&PendingSession>) -> bool {
        other.is_some_and(|o| o.device.device_code == self.device.device_code)
    }

    fn pending_response(&self, message: &str) -> ActivationResponse {
        let mut response = ActivationResponse::new(ActivationState::Pending, message);
        response.url = Some(self.url());
        response.user_code = self.device.user_code.clone();
        response
    }
}

#[derive(Debug)]
pub struct DeviceActivation {
    credentials: CredentialManager,
    config: ActivationConfig,
    /// held only for short reads and updates, never across a network call
    pending: Mutex<Option<PendingSession>>,
    /// held by the one `complete` call that is polling
    polling: Mutex<()>,
}

impl DeviceActivation {
    pub fn new(credentials: CredentialManager, config: ActivationConfig) -> Self {
        Self { credentials, config, pending: Mutex::new(None), polling: Mutex::new(()) }
    }

    pub async fn status(&self) -> ActivationResponse {
        let snapshot = self.credentials.snapshot().await;
        if snapshot.authorized {
            let mut response = ActivationResponse::new(ActivationState::Completed, "Device is activated and ready");
            response.authorized_at = snapshot.last_refresh_at;
            return response;
        }
        match self.current_session().await {
            Some(session) => session.pending_response(
                "Activation in progress, open the URL and then call /activation/complete",
            ),
            None => ActivationResponse::new(
                ActivationState::NotStarted,
                "Activation not started. Call /activation/start to begin",
            ),
        }
    }

    /// Request a device code, or reuse the outstanding one.
    pub async fn start(&self) -> GatewayResult<ActivationResponse> {
        if self.credentials.snapshot().await.authorized {
            return Ok(ActivationResponse::new(ActivationState::Completed, "Device is already activated"));
        }
        let message = "Please open the URL in your browser and authenticate";
        if let Some(session) = self.current_session().await {
            return Ok(session.pending_response(message));
        }

        let device = self.credentials.auth_client().request_device_code().await?;
        let requested = PendingSession { expires_at: expires_at_from(device.expires_in), device };
        let session = {
            let mut pending = self.pending.lock().await;
            match (*pending).clone().filter(|s| !s.is_expired()) {
                // a parallel start got there first
                Some(existing) => existing,
                None => {
                    *pending = Some(requested.clone());
                    get_metrics().await.activation_events.with_label_values(&["started"]).inc();
                    info!("device activation started, expires at {}", requested.expires_at);
                    requested
                }
            }
        };
        Ok(session.pending_response(message))
    }

    /// Poll the token endpoint until the user approved the device, gave up, or attempts ran out.
    pub async fn complete(&self) -> GatewayResult<ActivationResponse> {
        let metrics = get_metrics().await;
        if self.credentials.snapshot().await.authorized {
            return Ok(ActivationResponse::new(ActivationState::Completed, "Device is already activated"));
        }
        let _polling = self
            .polling
            .try_lock()
            .map_err(|_| GatewayError::Activation("activation is already being completed".into()))?;

        let current = (*self.pending.lock().await).clone();
        let session = match current {
            Some(session) if !session.is_expired() => session,
            Some(expired) => {
                self.forget(&expired.device.device_code).await;
                return Err(GatewayError::Activation("device code expired, call /activation/start again".into()));
            }
            None => return Err(GatewayError::Activation("activation not started".into())),
        };

        let mut interval_ms = (session.device.interval * 1000).max(self.config.min_poll_interval_ms);
        for attempt in 1..=self.config.poll_attempts.max(1) {
            match self.credentials.auth_client().poll_device_token(&session.device.device_code).await {
                Ok(DevicePoll::Granted(grant)) => {
                    let credential = {
                        let mut pending = self.pending.lock().await;
                        if !session.is_same(pending.as_ref()) {
                            return Err(GatewayError::Activation("activation was reset while polling".into()));
                        }
                        let credential = self.credentials.install(grant).await?;
                        *pending = None;
                        credential
                    };
                    metrics.activation_events.with_label_values(&["completed"]).inc();
                    info!("device activation completed after {} poll(s)", attempt);
                    let mut response = ActivationResponse::new(
                        ActivationState::Completed,
                        "Activation successful! Token saved and verified",
                    );
                    response.authorized_at = Some(now());
                    info!("activated credential expires at {}", credential.expires_at);
                    return Ok(response);
                }
                Ok(DevicePoll::Pending) => {}
                Ok(DevicePoll::SlowDown) => interval_ms += SLOW_DOWN_STEP_MS,
                Ok(DevicePoll::Denied(reason)) => {
                    self.forget(&session.device.device_code).await;
                    metrics.activation_events.with_label_values(&["denied"]).inc();
                    warn!("device activation ended: {}", reason);
                    return Err(GatewayError::Activation(reason));
                }
                Err(e) if e.is_transient() => warn!("activation poll {} failed: {}", attempt, e),
                Err(e) => return Err(e),
            }
            if session.is_expired() {
                self.forget(&session.device.device_code).await;
                return Err(GatewayError::Activation("device code expired before approval".into()));
            }
            if !session.is_same(self.pending.lock().await.as_ref()) {
                return Err(GatewayError::Activation("activation was reset while polling".into()));
            }
            if attempt < self.config.poll_attempts {
                tokio::time::sleep(Duration::from_millis(interval_ms)).await;
            }
        }

        Ok(session.pending_response(
            "Activation not complete yet. Please make sure you completed authentication in the browser and try again.",
        ))
    }

    async fn current_session(&self) -> Option<PendingSession> {
        (*self.pending.lock().await).clone().filter(|s| !s.is_expired())
    }

    /// Drop the pending session if it is still the one identified by `device_code`.
    async fn forget(&self, device_code: &str) {
        let mut pending = self.pending.lock().await;
        if pending.as_ref().is_some_and(|s| s.device.device_code == device_code) {
            *pending = None;
        }
    }

    /// Forget any pending session and the stored credential.
    pub async fn reset(&self) -> GatewayResult<ActivationResponse> {
        *self.pending.lock().await = None;
        self.credentials.deauthorize().await?;
        get_metrics().await.activation_events.with_label_values(&["reset"]).inc();
        Ok(ActivationResponse::new(
            ActivationState::NotStarted,
            "Activation process has been reset. You can start over.",
        ))
    }
}
