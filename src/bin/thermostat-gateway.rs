use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use thermostat_gateway::config::loader::{self, ConfigOverrides};
use thermostat_gateway::config::settings::LogFormat;
use thermostat_gateway::server;
use thermostat_gateway::server::server::AppState;
use thermostat_gateway::utils::logging;
use thermostat_gateway::utils::logging::LogLevel;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// optional YAML config, `${VAR:default}` placeholders are expanded
    #[arg(short, long, env = "CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "TOKEN_PATH")]
    token_path: Option<String>,
    #[arg(long, env = "UPSTREAM_BASE_URL")]
    upstream_base_url: Option<String>,
    #[arg(long, env = "REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,
    #[arg(long, env = "AUTH_TOKEN_URL")]
    auth_token_url: Option<String>,
    #[arg(long, env = "AUTH_DEVICE_URL")]
    auth_device_url: Option<String>,
    #[arg(long, env = "AUTH_CLIENT_ID")]
    auth_client_id: Option<String>,
    #[arg(long, env = "AUTH_SCOPE")]
    auth_scope: Option<String>,
    #[arg(long, env = "SAFETY_MARGIN_SECONDS")]
    safety_margin_seconds: Option<u64>,
    #[arg(long, env = "HOST")]
    host: Option<String>,
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<String>,
    #[arg(long, env = "LOG_LEVEL", value_enum)]
    log_level: Option<LogLevel>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            token_path: self.token_path.clone(),
            upstream_base_url: self.upstream_base_url.clone(),
            request_timeout_ms: self.request_timeout_ms,
            auth_token_url: self.auth_token_url.clone(),
            auth_device_url: self.auth_device_url.clone(),
            auth_client_id: self.auth_client_id.clone(),
            auth_scope: self.auth_scope.clone(),
            safety_margin_seconds: self.safety_margin_seconds,
            host: self.host.clone(),
            port: self.port,
            static_dir: self.static_dir.clone(),
            log_level: self.log_level.map(|level| level.as_str().to_owned()),
            log_format: LogFormat::from_env(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // -------------------------------
    // 1. Load config: YAML file, then flags / env
    // -------------------------------

    let args = Args::parse();
    let service_config = loader::run(args.config.as_deref(), args.overrides()).await?;
    logging::init_logging(&service_config.logging);
    if let Ok(value) = std::env::var("LOG_FORMAT") {
        if LogFormat::parse(&value).is_none() {
            warn!("ignoring unknown LOG_FORMAT '{}', expected 'json' or 'compact'", value);
        }
    }

    // -------------------------------
    // 2. Token store, credential manager, upstream client
    // -------------------------------

    let state = AppState::from_config(&service_config).await?;

    // -------------------------------
    // 3. Serve until shutdown signal
    // -------------------------------

    info!("Service starting...");
    server::server::start(&service_config, state).await?;

    Ok(())
}
