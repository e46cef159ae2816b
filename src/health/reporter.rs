use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::credentials::manager::CredentialManager;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub serving: bool,
    pub authorized: bool,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub token_file_present: bool,
}

/// Liveness for orchestrators. Reads local state only, never the upstream.
#[derive(Debug, Clone)]
pub struct HealthReporter {
    credentials: CredentialManager,
}

impl HealthReporter {
    pub fn new(credentials: CredentialManager) -> Self {
        Self { credentials }
    }

    pub async fn check(&self) -> HealthStatus {
        let snapshot = self.credentials.snapshot().await;
        HealthStatus {
            // serving before activation is expected
            serving: true,
            authorized: snapshot.authorized,
            last_refresh_at: snapshot.last_refresh_at,
            token_file_present: self.credentials.token_store().exists().await,
        }
    }
}
