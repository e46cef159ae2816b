use std::sync::Arc;

use http::Method;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::credentials::auth_client::json_or_text;
use crate::credentials::manager::CredentialManager;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics::get_metrics;
use crate::resilience::retry::RetrySettings;

static TRANSPORT_ERROR_MSG: &str = "transport_error";

#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    /// relative to the configured base url
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Value>,
}

impl UpstreamRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self { method: Method::GET, path: path.into(), query: None, body: None }
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.is_empty());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Value,
}

/// Authenticated calls to the vendor API.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    base_url: Arc<String>,
    credentials: CredentialManager,
    retry: RetrySettings,
}

impl UpstreamClient {
    pub fn new(client: Client, base_url: &str, credentials: CredentialManager, retry: RetrySettings) -> Self {
        Self {
            client,
            base_url: Arc::new(base_url.trim_end_matches('/').to_owned()),
            credentials,
            retry,
        }
    }

    /// A 401 forces one refresh and one retry; a second 401 is surfaced as-is.
    /// Requests rejected with the same token share that refresh.
    pub async fn call(&self, request: &UpstreamRequest) -> GatewayResult<UpstreamResponse> {
        let lease = self.credentials.lease_access_token().await?;
        let (status, body) = self.send_with_backoff(request, &lease.access_token).await?;
        if status != StatusCode::UNAUTHORIZED {
            return into_result(status, body);
        }

        warn!("upstream rejected access token for '{}', refreshing once", request.path);
        let refreshed = self.credentials.refresh_if_current(&lease).await?;
        let (status, body) = self.send_with_backoff(request, &refreshed.access_token).await?;
        into_result(status, body)
    }

    async fn send_with_backoff(&self, request: &UpstreamRequest, token: &str) -> GatewayResult<(StatusCode, Value)> {
        self.retry
            .run_with_retry(|| self.send_once(request, token), GatewayError::is_transient)
            .await
    }

    async fn send_once(&self, request: &UpstreamRequest, token: &str) -> GatewayResult<(StatusCode, Value)> {
        let metrics = get_metrics().await;
        let start = Instant::now();
        let url = self.url_for(request);
        debug!("upstream {} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), &url).bearer_auth(token);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let result = async {
            let response = builder.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, json_or_text(&text)))
        }
        .await;
        metrics.upstream_duration.observe(start.elapsed().as_secs_f64());

        match result {
            Ok((status, body)) => {
                metrics.upstream_requests.with_label_values(&[status.as_str()]).inc();
                info!("upstream {} '{}' -> {}", request.method, request.path, status);
                Ok((status, body))
            }
            Err(e) => {
                metrics.upstream_requests.with_label_values(&[TRANSPORT_ERROR_MSG]).inc();
                Err(GatewayError::Unavailable(format!("{} {}: {}", request.method, request.path, e)))
            }
        }
    }

    fn url_for(&self, request: &UpstreamRequest) -> String {
        let mut url = format!("{}/{}", self.base_url, request.path.trim_start_matches('/'));
        if let Some(query) = &request.query {
            url.push('?');
            url.push_str(query);
        }
        url
    }
}

fn into_result(status: StatusCode, body: Value) -> GatewayResult<UpstreamResponse> {
    if status.is_success() {
        Ok(UpstreamResponse { status: status.as_u16(), body })
    } else {
        Err(GatewayError::Upstream { status: status.as_u16(), body })
    }
}
