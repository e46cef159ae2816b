//! Owner of the process-wide credential.
//!
//! All refreshes go through one gate. A caller remembers the generation it saw before
//! queueing on the gate; if the generation moved by the time it gets in, some other
//! caller already refreshed and the stored outcome is returned instead of a second
//! upstream call. The refresh itself runs in a spawned task holding the owned gate
//! guard, so a dropped inbound request never abandons it half way.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::credentials::auth_client::AuthClient;
use crate::credentials::credential::{Credential, TokenGrant};
use crate::credentials::token_store::TokenStore;
use crate::error::{GatewayError, GatewayResult};
use crate::helpers::time::now;
use crate::observability::metrics::get_metrics;

static SUCCESS_MSG: &str = "success";
static REJECTED_MSG: &str = "rejected";
static ERROR_MSG: &str = "error";

#[derive(Debug, Default)]
struct CredentialState {
    credential: Option<Credential>,
    /// bumped on every change of `credential` or refresh attempt
    generation: u64,
    /// outcome of the refresh that produced `generation`, shared with coalesced waiters
    last_outcome: Option<GatewayResult<Credential>>,
    last_refresh_at: Option<DateTime<Utc>>,
}

impl CredentialState {
    fn replace(&mut self, credential: Option<Credential>, outcome: Option<GatewayResult<Credential>>) {
        self.credential = credential;
        self.last_outcome = outcome;
        self.generation += 1;
    }
}

/// Access token together with the credential generation it was read from.
#[derive(Debug, Clone)]
pub struct AccessLease {
    pub access_token: String,
    pub generation: u64,
}

/// Non-blocking view used by the health reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CredentialSnapshot {
    pub authorized: bool,
    pub last_refresh_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct Inner {
    store: TokenStore,
    auth: AuthClient,
    safety_margin_seconds: u64,
    state: RwLock<CredentialState>,
    refresh_gate: Arc<Mutex<()>>,
}

#[derive(Debug, Clone)]
pub struct CredentialManager {
    inner: Arc<Inner>,
}

impl CredentialManager {
    /// Seeds in-memory state from the token store.
    pub async fn new(store: TokenStore, auth: AuthClient, safety_margin_seconds: u64) -> Self {
        let credential = store.load().await;
        info!(
            "credential manager started, authorized: {}, token path: '{}'",
            credential.is_some(),
            store.path().display()
        );
        Self {
            inner: Arc::new(Inner {
                store,
                auth,
                safety_margin_seconds,
                state: RwLock::new(CredentialState { credential, ..Default::default() }),
                refresh_gate: Arc::new(Mutex::new(())),
            }),
        }
    }

    pub fn token_store(&self) -> &TokenStore {
        &self.inner.store
    }

    pub fn auth_client(&self) -> &AuthClient {
        &self.inner.auth
    }

    /// Valid access token, refreshing first when it is inside the safety margin.
    pub async fn get_access_token(&self) -> GatewayResult<String> {
        self.lease_access_token().await.map(|lease| lease.access_token)
    }

    /// Like `get_access_token`, also returning the generation the token belongs to.
    /// Hand the lease back to `refresh_if_current` when the upstream rejects it.
    pub async fn lease_access_token(&self) -> GatewayResult<AccessLease> {
        let (generation, credential) = {
            let state = self.inner.state.read().await;
            (state.generation, state.credential.clone())
        };
        let credential = credential.ok_or(GatewayError::Unauthorized)?;
        if !credential.needs_refresh(self.inner.safety_margin_seconds) {
            return Ok(AccessLease { access_token: credential.access_token, generation });
        }
        let (credential, generation) = self.refresh_from(generation).await?;
        Ok(AccessLease { access_token: credential.access_token, generation })
    }

    /// Forced refresh; concurrent callers share a single upstream call.
    pub async fn refresh(&self) -> GatewayResult<Credential> {
        let generation = self.inner.state.read().await.generation;
        self.refresh_from(generation).await.map(|(credential, _)| credential)
    }

    /// Forced refresh for a rejected lease. If the credential already moved past the
    /// lease's generation, the newer credential is returned without an upstream call.
    pub async fn refresh_if_current(&self, lease: &AccessLease) -> GatewayResult<Credential> {
        self.refresh_from(lease.generation).await.map(|(credential, _)| credential)
    }

    async fn refresh_from(&self, observed_generation: u64) -> GatewayResult<(Credential, u64)> {
        let guard = self.inner.refresh_gate.clone().lock_owned().await;
        {
            let state = self.inner.state.read().await;
            if state.generation != observed_generation {
                if let Some(outcome) = &state.last_outcome {
                    get_metrics().await.credential_refresh_coalesced.inc();
                    return outcome.clone().map(|credential| (credential, state.generation));
                }
                // changed by bootstrap/install/deauthorize rather than by a refresh
                match &state.credential {
                    None => return Err(GatewayError::Unauthorized),
                    Some(c) if !c.needs_refresh(self.inner.safety_margin_seconds) => {
                        return Ok((c.clone(), state.generation))
                    }
                    Some(_) => {}
                }
            } else if state.credential.is_none() {
                return Err(GatewayError::Unauthorized);
            }
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let _guard = guard;
            inner.perform_refresh().await
        })
        .await
        .map_err(|e| GatewayError::Unavailable(format!("refresh task failed: {}", e)))?
    }

    /// Seed from an externally obtained refresh token; persisted before it is used.
    pub async fn bootstrap(&self, refresh_token: &str) -> GatewayResult<()> {
        let refresh_token = refresh_token.trim();
        if refresh_token.is_empty() {
            return Err(GatewayError::BadRequest("refresh token must not be empty".into()));
        }
        let _gate = self.inner.refresh_gate.lock().await;
        self.inner.store.save(refresh_token).await?;
        let mut state = self.inner.state.write().await;
        state.replace(Some(Credential::from_refresh_token(refresh_token.to_owned())), None);
        state.last_refresh_at = None;
        info!("credential bootstrapped from external refresh token");
        Ok(())
    }

    /// Seed from a complete grant (device activation); the access token is usable right away.
    pub async fn install(&self, grant: TokenGrant) -> GatewayResult<Credential> {
        let credential = Credential::from_grant(grant, None)
            .ok_or_else(|| GatewayError::Activation("authorization server issued no refresh token".into()))?;
        let _gate = self.inner.refresh_gate.lock().await;
        self.inner.store.save(&credential.refresh_token).await?;
        let mut state = self.inner.state.write().await;
        state.replace(Some(credential.clone()), None);
        state.last_refresh_at = Some(now());
        info!("credential installed, access token expires at {}", credential.expires_at);
        Ok(credential)
    }

    /// Drop the credential from memory and disk.
    pub async fn deauthorize(&self) -> GatewayResult<()> {
        let _gate = self.inner.refresh_gate.lock().await;
        {
            let mut state = self.inner.state.write().await;
            state.replace(None, None);
            state.last_refresh_at = None;
        }
        self.inner.store.clear().await?;
        info!("credential de-authorized");
        Ok(())
    }

    pub async fn snapshot(&self) -> CredentialSnapshot {
        let state = self.inner.state.read().await;
        CredentialSnapshot {
            authorized: state.credential.is_some(),
            last_refresh_at: state.last_refresh_at,
        }
    }
}

impl Inner {
    /// Caller must hold the refresh gate.
    async fn perform_refresh(&self) -> GatewayResult<(Credential, u64)> {
        let metrics = get_metrics().await;
        let previous = self
            .state
            .read()
            .await
            .credential
            .as_ref()
            .map(|c| c.refresh_token.clone())
            .ok_or(GatewayError::Unauthorized)?;

        info!("refreshing access token");
        match self.auth.refresh(&previous).await {
            Ok(grant) => {
                let credential = Credential::from_grant(grant, Some(&previous))
                    .ok_or_else(|| GatewayError::AuthRejected("no refresh token available".into()))?;
                let persisted = self.store.save(&credential.refresh_token).await;
                let outcome = persisted.map(|_| credential.clone());
                if let Err(e) = &outcome {
                    error!("access token refreshed but persisting refresh token failed: {}", e);
                }

                let mut state = self.state.write().await;
                state.replace(Some(credential.clone()), Some(outcome.clone()));
                state.last_refresh_at = Some(now());
                metrics.credential_refresh.with_label_values(&[SUCCESS_MSG]).inc();
                info!("access token refreshed, expires at {}", credential.expires_at);
                let generation = state.generation;
                outcome.map(|credential| (credential, generation))
            }
            Err(GatewayError::AuthRejected(reason)) => {
                warn!("refresh rejected, credential cleared, re-authorization required");
                let mut state = self.state.write().await;
                state.replace(None, Some(Err(GatewayError::Unauthorized)));
                metrics.credential_refresh.with_label_values(&[REJECTED_MSG]).inc();
                Err(GatewayError::AuthRejected(reason))
            }
            Err(e) => {
                error!("refresh failed: {}", e);
                let mut state = self.state.write().await;
                let credential = state.credential.take();
                state.replace(credential, Some(Err(e.clone())));
                metrics.credential_refresh.with_label_values(&[ERROR_MSG]).inc();
                Err(e)
            }
        }
    }
}
