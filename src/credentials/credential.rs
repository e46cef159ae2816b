use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::helpers::time::{expires_at_from, is_within_margin};

/// Current access/refresh token pair. Owned by the credential manager.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Credential restored from the token file: refresh token only, access token already stale.
    pub fn from_refresh_token(refresh_token: String) -> Self {
        Self {
            access_token: String::new(),
            refresh_token,
            expires_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Apply a token endpoint grant; the refresh token only rotates when a new one is issued.
    pub fn from_grant(grant: TokenGrant, previous_refresh_token: Option<&str>) -> Option<Self> {
        let refresh_token = grant
            .refresh_token
            .filter(|rt| !rt.is_empty())
            .or_else(|| previous_refresh_token.map(str::to_owned))?;
        Some(Self {
            access_token: grant.access_token,
            refresh_token,
            expires_at: expires_at_from(grant.expires_in),
        })
    }

    pub fn needs_refresh(&self, safety_margin_seconds: u64) -> bool {
        self.access_token.is_empty() || is_within_margin(self.expires_at, safety_margin_seconds)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful token endpoint response (`refresh_token` and `device_code` grants).
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

fn default_expires_in() -> u64 {
    // providers omitting expires_in get treated as short-lived
    300
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("refresh_token_issued", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
