//! HTTP JSON-RPC node client backed by `reqwest`.
//!
//! One client is bound to one endpoint. Domain calls retry transient
//! failures with exponential backoff; the `health` probe does not, since the
//! pool bounds it with its own validation timeout.

use std::time::Duration;

use async_trait::async_trait;

use chainpool_core::error::TransportError;
use chainpool_core::policy::{RetryConfig, RetryPolicy};
use chainpool_core::request::{JsonRpcRequest, JsonRpcResponse};
use chainpool_core::transport::{NodeClient, RequestIds};

/// Configuration for `HttpNodeClient`.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// JSON-RPC session with a single full node.
pub struct HttpNodeClient {
    url: String,
    endpoint_id: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    ids: RequestIds,
}

impl std::fmt::Debug for HttpNodeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpNodeClient")
            .field("url", &self.url)
            .field("endpoint_id", &self.endpoint_id)
            .finish()
    }
}

impl HttpNodeClient {
    /// Build a client for `url`. `endpoint_id` is the registry key of the endpoint.
    pub fn connect(
        url: impl Into<String>,
        endpoint_id: impl Into<String>,
        config: &HttpClientConfig,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| TransportError::Http(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            endpoint_id: endpoint_id.into(),
            http,
            retry: RetryPolicy::new(config.retry.clone()),
            ids: RequestIds::default(),
        })
    }

    /// Build a client with default configuration, keyed by its own address.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        let id = chainpool_core::endpoint::endpoint_id(&url);
        Self::connect(url, id, &HttpClientConfig::default())
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %self.url,
                            method = %req.method,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(attempt, error = %e, url = %self.url, "max retries exceeded");
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn next_id(&self) -> i64 {
        self.ids.next()
    }

    async fn health(&self) -> Result<(), TransportError> {
        let resp = self.send_once(&JsonRpcRequest::health(self.next_id())).await?;
        resp.into_result().map_err(TransportError::Rpc)?;
        Ok(())
    }
}
