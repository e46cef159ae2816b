use serde::Deserialize;

use crate::utils::constants::{
    DEFAULT_AUTH_CLIENT_ID, DEFAULT_AUTH_DEVICE_URL, DEFAULT_AUTH_SCOPE, DEFAULT_AUTH_TOKEN_URL,
    DEFAULT_HTTP_TIMEOUT_MS, DEFAULT_SAFETY_MARGIN_SECS, DEFAULT_TOKEN_PATH, DEFAULT_UPSTREAM_BASE_URL,
};

/// ================================
/// Full service configuration
/// ================================
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub settings: SettingsConfig,
    pub token: TokenConfig,
    pub auth: AuthConfig,
    pub upstream: UpstreamConfig,
    pub activation: ActivationConfig,
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// ================================
/// Global service-wide settings
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SettingsConfig {
    /// refresh the access token this many seconds before it expires
    pub safety_margin_seconds: u64,
    pub retry: RetryConfig,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            safety_margin_seconds: DEFAULT_SAFETY_MARGIN_SECS,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    /// will be mutiply by 2 on every attempt until max_delay_ms
    pub base_delay_ms: u64,
    /// invariant: >= base_delay_ms
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

/// ================================
/// Credentials
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TokenConfig {
    pub path: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self { path: DEFAULT_TOKEN_PATH.to_owned() }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub token_url: String,
    pub device_authorize_url: String,
    pub client_id: String,
    pub scope: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_AUTH_TOKEN_URL.to_owned(),
            device_authorize_url: DEFAULT_AUTH_DEVICE_URL.to_owned(),
            client_id: DEFAULT_AUTH_CLIENT_ID.to_owned(),
            scope: DEFAULT_AUTH_SCOPE.to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_owned(),
            request_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ActivationConfig {
    /// how many times `complete` polls the token endpoint before giving up
    pub poll_attempts: u32,
    /// lower bound for the poll interval, the server-provided interval wins when larger
    pub min_poll_interval_ms: u64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        Self {
            poll_attempts: 30,
            min_poll_interval_ms: 1000,
        }
    }
}

/// ================================
/// Server & observability
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8000,
            static_dir: "static".to_owned(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MetricsConfig {
    pub path: String,
    pub is_enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            path: "/metrics".to_owned(),
            is_enabled: true,
        }
    }
}

/// ================================
/// Logging
/// ================================
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String, // allowed: trace, debug, info, warn, error
    pub format: LogFormat,
}

impl LoggingConfig {
    pub fn new(level: String, format: LogFormat) -> Self {
        Self { level, format }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new("info".to_owned(), LogFormat::Compact)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Compact,
}

impl LogFormat {
    /// `LOG_FORMAT` override; unknown values leave the configured format in place.
    pub fn from_env() -> Option<Self> {
        std::env::var("LOG_FORMAT").ok().and_then(|value| Self::parse(&value))
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "json" => Some(LogFormat::Json),
            "compact" | "text" => Some(LogFormat::Compact),
            _ => None,
        }
    }
}
