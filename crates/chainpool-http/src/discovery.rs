//! Remote endpoint discovery over HTTP.

use async_trait::async_trait;

use chainpool_core::discovery::EndpointSource;
use chainpool_core::error::PoolError;

/// Fetches a plain-text, comma-separated node list from a URL.
///
/// The template's `{chain_id}` placeholder is replaced with the chain being
/// served, e.g. `https://raw.githubusercontent.com/org/registry/main/{chain_id}/rpc_nodes`.
pub struct RemoteListSource {
    url_template: String,
    http: reqwest::Client,
}

impl RemoteListSource {
    pub fn new(url_template: impl Into<String>) -> Result<Self, PoolError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PoolError::Config(e.to_string()))?;
        Ok(Self {
            url_template: url_template.into(),
            http,
        })
    }

    pub fn url_for(&self, chain_id: &str) -> String {
        self.url_template.replace("{chain_id}", chain_id)
    }
}

#[async_trait]
impl EndpointSource for RemoteListSource {
    async fn endpoints(&self, chain_id: &str) -> Result<String, PoolError> {
        let url = self.url_for(chain_id);
        let fail = |reason: String| PoolError::Discovery {
            chain_id: chain_id.to_string(),
            reason,
        };

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| fail(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(fail(format!("GET {url}: HTTP {}", resp.status().as_u16())));
        }
        let body = resp.text().await.map_err(|e| fail(e.to_string()))?;

        tracing::info!(chain_id, %url, "fetched endpoint list");
        Ok(body.trim().to_string())
    }
}
