//! Pool factory producing `HttpNodeClient`s bound to registry endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use chainpool_core::endpoint::EndpointRegistry;
use chainpool_core::error::PoolError;
use chainpool_core::factory::PooledObjectFactory;
use chainpool_core::transport::NodeClient;

use crate::client::{HttpClientConfig, HttpNodeClient};

/// Creates one HTTP client per pooled object and reports connect and
/// validation outcomes back to the registry's circuit breakers.
pub struct HttpClientFactory {
    registry: Arc<EndpointRegistry>,
    config: HttpClientConfig,
    validation_timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(
        registry: Arc<EndpointRegistry>,
        config: HttpClientConfig,
        validation_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            config,
            validation_timeout,
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }
}

#[async_trait]
impl PooledObjectFactory for HttpClientFactory {
    type Object = HttpNodeClient;

    async fn make_object(&self) -> Result<HttpNodeClient, PoolError> {
        // init rejects empty endpoint lists, so this only fails on misuse
        let endpoint = self.registry.next_available().ok_or(PoolError::NoEndpoints)?;

        HttpNodeClient::connect(endpoint.address(), endpoint.id(), &self.config).map_err(|e| {
            self.registry.record_failure(endpoint.id());
            PoolError::Connect {
                endpoint: endpoint.address().to_string(),
                reason: e.to_string(),
            }
        })
    }

    async fn destroy_object(&self, obj: HttpNodeClient) {
        tracing::debug!(url = %obj.url(), "closing node client");
        drop(obj);
    }

    async fn validate_object(&self, obj: &HttpNodeClient) -> bool {
        let outcome = tokio::time::timeout(self.validation_timeout, obj.health()).await;
        match outcome {
            Ok(Ok(())) => {
                self.registry.record_success(obj.endpoint_id());
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %obj.url(), error = %e, "health check failed");
                self.registry.record_failure(obj.endpoint_id());
                false
            }
            Err(_) => {
                tracing::warn!(
                    url = %obj.url(),
                    timeout_ms = self.validation_timeout.as_millis() as u64,
                    "health check timed out"
                );
                self.registry.record_failure(obj.endpoint_id());
                false
            }
        }
    }
}
