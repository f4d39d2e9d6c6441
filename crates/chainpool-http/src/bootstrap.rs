//! Composition root: discovery → registry → factory → pool → facade.

use std::sync::Arc;

use chainpool_core::config::NodeSettings;
use chainpool_core::discovery::{EndpointSource, StaticSource};
use chainpool_core::endpoint::EndpointRegistry;
use chainpool_core::error::PoolError;
use chainpool_core::{ClientPool, ObjectPool};

use crate::client::HttpClientConfig;
use crate::discovery::RemoteListSource;
use crate::factory::HttpClientFactory;

/// The pool handle an application builds once and shares.
pub type HttpClientPool = ClientPool<HttpClientFactory>;

/// Pick the endpoint source named by the settings: a fixed list wins over
/// remote discovery.
pub fn source_for(settings: &NodeSettings) -> Result<Box<dyn EndpointSource>, PoolError> {
    match (&settings.endpoints, &settings.discovery_url) {
        (Some(list), _) => Ok(Box::new(StaticSource::new(list.clone()))),
        (None, Some(url)) => Ok(Box::new(RemoteListSource::new(url.clone())?)),
        (None, None) => Err(PoolError::Config(
            "one of `endpoints` or `discovery_url` must be set".into(),
        )),
    }
}

/// Build, pre-warm and start the pool described by `settings`.
///
/// Discovery failures and empty endpoint lists come back as fatal errors
/// ([`PoolError::is_fatal`]); the caller is expected to abort.
pub async fn init(settings: &NodeSettings) -> Result<HttpClientPool, PoolError> {
    let source = source_for(settings)?;
    init_with_source(settings, source.as_ref()).await
}

/// Like [`init`] with an explicit endpoint source.
pub async fn init_with_source(
    settings: &NodeSettings,
    source: &dyn EndpointSource,
) -> Result<HttpClientPool, PoolError> {
    let registry = Arc::new(discover(settings, source).await?);

    let client_config = HttpClientConfig {
        request_timeout: settings.request_timeout(),
        ..Default::default()
    };
    let factory = HttpClientFactory::new(registry, client_config, settings.validation_timeout());
    let pool = ObjectPool::new(factory, settings.pool_config())?;

    pool.prepare_pool().await?;
    if pool.start_idle_sweeper().is_some() {
        tracing::debug!(chain_id = %settings.chain_id, "idle sweeper started");
    }

    tracing::info!(
        chain_id = %settings.chain_id,
        max_total = settings.max_connection_num,
        idle = pool.num_idle(),
        "node client pool ready"
    );
    Ok(ClientPool::new(pool, settings.acquire_config()))
}

/// Fetch the endpoint list and build the registry.
pub async fn discover(
    settings: &NodeSettings,
    source: &dyn EndpointSource,
) -> Result<EndpointRegistry, PoolError> {
    let raw = source
        .endpoints(&settings.chain_id)
        .await
        .map_err(|e| match e {
            PoolError::Discovery { .. } => e,
            other => PoolError::Discovery {
                chain_id: settings.chain_id.clone(),
                reason: other.to_string(),
            },
        })?;
    EndpointRegistry::init(&raw)
}
