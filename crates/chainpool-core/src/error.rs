//! Error types for the node client pool and its wire clients.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors raised by a node client while talking to one endpoint.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, timeout, bad status, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if this error is retryable (transient).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::Timeout { .. })
    }

    /// Returns `true` if this is a node-side execution error (not retryable).
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}

/// Errors produced by the endpoint registry, the pool and the acquisition API.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The endpoint discovery call failed. Unrecoverable at startup.
    #[error("Endpoint discovery failed for chain '{chain_id}': {reason}")]
    Discovery { chain_id: String, reason: String },

    /// Discovery returned no usable endpoint. Unrecoverable at startup.
    #[error("No RPC endpoints found")]
    NoEndpoints,

    /// Invalid pool or client configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A new client could not be built for an endpoint.
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Every candidate object failed validation within one borrow.
    #[error("Unable to validate object after {attempts} attempts")]
    ValidationFailed { attempts: u32 },

    /// The pool has been closed.
    #[error("Pool closed")]
    Closed,

    /// Acquisition was cancelled before an object became available.
    #[error("Borrow cancelled")]
    Cancelled,

    /// No object could be obtained within the caller's deadline.
    #[error("rpc node timeout after {ms}ms")]
    Timeout { ms: u64 },

    /// A wire-level error surfaced through the pool.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PoolError {
    /// Returns `true` for startup errors after which no pool can be formed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Discovery { .. } | Self::NoEndpoints)
    }

    /// Returns `true` if a later borrow attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connect { .. }
            | Self::ValidationFailed { .. }
            | Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_retryable(),
            _ => false,
        }
    }
}
