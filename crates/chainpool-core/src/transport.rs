//! The `NodeClient` trait: the wire-level client a pooled object wraps.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// A session with exactly one full-node endpoint.
///
/// Implementations must be `Send + Sync` so a borrowed client can be used
/// from any Tokio task.
#[async_trait]
pub trait NodeClient: Send + Sync + 'static {
    /// Send a single JSON-RPC request and return the raw response.
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Endpoint address this client is bound to.
    fn url(&self) -> &str;

    /// Next request id for this session.
    fn next_id(&self) -> i64;

    /// Liveness probe. Side-effect free on the node.
    async fn health(&self) -> Result<(), TransportError> {
        let resp = self.send(JsonRpcRequest::health(self.next_id())).await?;
        resp.into_result().map_err(TransportError::Rpc)?;
        Ok(())
    }

    /// Call a method and deserialize the result.
    async fn call<T>(&self, method: &str, params: Value) -> Result<T, TransportError>
    where
        T: DeserializeOwned,
        Self: Sized,
    {
        let req = JsonRpcRequest::new(self.next_id(), method, params);
        let resp = self.send(req).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(TransportError::Deserialization)
    }
}

/// Monotonic per-session request id counter.
#[derive(Debug, Default)]
pub struct RequestIds(AtomicI64);

impl RequestIds {
    pub fn next(&self) -> i64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}
