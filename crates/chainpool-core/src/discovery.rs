//! Endpoint discovery: where the comma-separated node list comes from.

use async_trait::async_trait;

use crate::error::PoolError;

/// Source of candidate endpoint addresses for a chain.
///
/// Consumed once at startup. Implementations return the raw
/// comma-separated list; parsing belongs to the registry.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn endpoints(&self, chain_id: &str) -> Result<String, PoolError>;
}

/// A fixed list, e.g. from configuration or the command line.
#[derive(Debug, Clone)]
pub struct StaticSource(pub String);

impl StaticSource {
    pub fn new(list: impl Into<String>) -> Self {
        Self(list.into())
    }
}

#[async_trait]
impl EndpointSource for StaticSource {
    async fn endpoints(&self, _chain_id: &str) -> Result<String, PoolError> {
        Ok(self.0.clone())
    }
}
