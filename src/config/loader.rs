use std::path::Path;

use anyhow::{bail, Context, Result};
use regex::Regex;
use reqwest::Url;
use tracing::{debug, error};

use crate::config::settings::{LogFormat, ServiceConfig};

/// Values taken from CLI flags / environment, applied on top of the YAML file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub token_path: Option<String>,
    pub upstream_base_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
    pub auth_token_url: Option<String>,
    pub auth_device_url: Option<String>,
    pub auth_client_id: Option<String>,
    pub auth_scope: Option<String>,
    pub safety_margin_seconds: Option<u64>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
}

/// Build the effective config: optional YAML file, then overrides, then validation.
pub async fn run(config_path: Option<&Path>, overrides: ConfigOverrides) -> Result<ServiceConfig> {
    let mut service_config = match config_path {
        Some(path) => file_to_config(path).await?,
        None => ServiceConfig::default(),
    };
    apply_overrides(&mut service_config, overrides);
    validate_service_config(&service_config)?;
    Ok(service_config)
}

/// Load config from YAML file
pub async fn file_to_config(path: &Path) -> Result<ServiceConfig> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read config file {}", path.display()))?;

    let expanded = expand_env_vars(&content);
    parse_config(&expanded)
}

pub fn parse_config(content: &str) -> Result<ServiceConfig> {
    // an empty document deserializes to unit, treat it as "all defaults"
    if content.trim().is_empty() {
        return Ok(ServiceConfig::default());
    }
    serde_yaml::from_str(content)
        .inspect_err(|e| error!("parse config error: {}", e))
        .context("Invalid config format")
}

pub fn apply_overrides(config: &mut ServiceConfig, overrides: ConfigOverrides) {
    if let Some(v) = overrides.token_path {
        config.token.path = v;
    }
    if let Some(v) = overrides.upstream_base_url {
        config.upstream.base_url = v;
    }
    if let Some(v) = overrides.request_timeout_ms {
        config.upstream.request_timeout_ms = v;
    }
    if let Some(v) = overrides.auth_token_url {
        config.auth.token_url = v;
    }
    if let Some(v) = overrides.auth_device_url {
        config.auth.device_authorize_url = v;
    }
    if let Some(v) = overrides.auth_client_id {
        config.auth.client_id = v;
    }
    if let Some(v) = overrides.auth_scope {
        config.auth.scope = v;
    }
    if let Some(v) = overrides.safety_margin_seconds {
        config.settings.safety_margin_seconds = v;
    }
    if let Some(v) = overrides.host {
        config.server.host = v;
    }
    if let Some(v) = overrides.port {
        config.server.port = v;
    }
    if let Some(v) = overrides.static_dir {
        config.server.static_dir = v;
    }
    if let Some(v) = overrides.log_level {
        config.logging.level = v;
    }
    if let Some(v) = overrides.log_format {
        config.logging.format = v;
    }
}

pub fn validate_service_config(config: &ServiceConfig) -> Result<()> {
    debug!("validation config ...");
    for (name, url) in [
        ("upstream.base_url", &config.upstream.base_url),
        ("auth.token_url", &config.auth.token_url),
        ("auth.device_authorize_url", &config.auth.device_authorize_url),
    ] {
        Url::parse(url).with_context(|| format!("'{}' is not a valid URL: '{}'", name, url))?;
    }
    if config.token.path.trim().is_empty() {
        bail!("'token.path' must not be empty");
    }
    if config.auth.client_id.trim().is_empty() {
        bail!("'auth.client_id' must not be empty");
    }
    if config.server.port == 0 {
        bail!("'server.port' must be greater than 0");
    }
    if config.upstream.request_timeout_ms == 0 {
        bail!("'upstream.request_timeout_ms' must be greater than 0");
    }
    let retry = &config.settings.retry;
    if retry.attempts == 0 {
        bail!("'settings.retry.attempts' must be at least 1");
    }
    if retry.base_delay_ms > retry.max_delay_ms {
        bail!(
            "'settings.retry.base_delay_ms' ({}) must not exceed 'max_delay_ms' ({})",
            retry.base_delay_ms,
            retry.max_delay_ms
        );
    }
    if config.metrics.is_enabled && !config.metrics.path.starts_with('/') {
        bail!("'metrics.path' must start with '/'");
    }
    Ok(())
}

/// Replaces `${VAR}` and `${VAR:default}` with environment values.
pub fn expand_env_vars(input: &str) -> String {
    let re = Regex::new(r"\$\{(\w+)(?::([^\}]+))?\}").expect("static regex");
    re.replace_all(input, |caps: &regex::Captures| {
        let var = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}
