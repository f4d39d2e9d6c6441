//! Endpoint registry: the discovered set of candidate full nodes.
//!
//! Populated once from the comma-separated list returned by discovery and
//! read concurrently afterwards. Availability is tracked per endpoint with a
//! circuit breaker fed by the client factory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};

use crate::error::PoolError;
use crate::policy::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// Stable identifier of an endpoint, derived from its address.
pub type EndpointId = String;

/// Derive the registry key for an address: first 16 hex chars of its SHA-256.
pub fn endpoint_id(address: &str) -> EndpointId {
    let digest = Sha256::digest(address.as_bytes());
    hex::encode(&digest[..8])
}

/// A candidate full-node RPC endpoint.
#[derive(Debug)]
pub struct Endpoint {
    id: EndpointId,
    address: String,
    circuit: CircuitBreaker,
}

impl Endpoint {
    fn new(address: &str, circuit: CircuitBreakerConfig) -> Self {
        Self {
            id: endpoint_id(address),
            address: address.to_string(),
            circuit: CircuitBreaker::new(circuit),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// `true` unless the endpoint's circuit is open.
    pub fn available(&self) -> bool {
        self.circuit.is_allowed()
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.state()
    }
}

/// Write-once, read-many set of endpoints with round-robin selection.
#[derive(Debug)]
pub struct EndpointRegistry {
    endpoints: Vec<Endpoint>,
    by_id: HashMap<EndpointId, usize>,
    cursor: AtomicUsize,
}

impl EndpointRegistry {
    /// Build the registry from a comma-separated address list.
    ///
    /// Blank entries are dropped and duplicates collapse onto one endpoint.
    /// An empty result is fatal: a pool without endpoints can never serve
    /// a borrow.
    pub fn init(raw: &str) -> Result<Self, PoolError> {
        Self::with_circuit(raw, CircuitBreakerConfig::default())
    }

    /// Like [`init`](Self::init) with a custom per-endpoint circuit configuration.
    pub fn with_circuit(raw: &str, circuit: CircuitBreakerConfig) -> Result<Self, PoolError> {
        let mut endpoints = Vec::new();
        let mut by_id = HashMap::new();
        for address in raw.split(',').map(str::trim).filter(|a| !a.is_empty()) {
            let endpoint = Endpoint::new(address, circuit.clone());
            if by_id.contains_key(endpoint.id()) {
                tracing::debug!(address, "duplicate endpoint ignored");
                continue;
            }
            by_id.insert(endpoint.id.clone(), endpoints.len());
            endpoints.push(endpoint);
        }

        if endpoints.is_empty() {
            return Err(PoolError::NoEndpoints);
        }
        tracing::info!(count = endpoints.len(), "endpoint registry initialized");

        Ok(Self {
            endpoints,
            by_id,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn lookup(&self, id: &str) -> Option<&Endpoint> {
        self.by_id.get(id).map(|&i| &self.endpoints[i])
    }

    /// All endpoints currently in rotation, in registry order.
    pub fn all_available(&self) -> Vec<&Endpoint> {
        self.endpoints.iter().filter(|e| e.available()).collect()
    }

    /// All endpoints, in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }

    /// Pick the endpoint for the next client.
    ///
    /// Round robin from a shared cursor, skipping endpoints whose circuit is
    /// open. When every circuit is open the plain round-robin choice is
    /// returned so creation can still probe the network.
    pub fn next_available(&self) -> Option<&Endpoint> {
        let len = self.endpoints.len();
        if len == 0 {
            return None;
        }
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        (0..len)
            .map(|i| &self.endpoints[(start + i) % len])
            .find(|e| e.available())
            .or(Some(&self.endpoints[start]))
    }

    pub fn record_success(&self, id: &str) {
        if let Some(endpoint) = self.lookup(id) {
            if endpoint.circuit.record_success() {
                tracing::info!(endpoint = %endpoint.address, "endpoint back in rotation");
            }
        }
    }

    pub fn record_failure(&self, id: &str) {
        if let Some(endpoint) = self.lookup(id) {
            if endpoint.circuit.record_failure() {
                tracing::warn!(endpoint = %endpoint.address, "endpoint taken out of rotation");
            }
        }
    }

    /// `(address, available, circuit state)` for every endpoint.
    pub fn health_summary(&self) -> Vec<(String, bool, CircuitState)> {
        self.endpoints
            .iter()
            .map(|e| (e.address.clone(), e.available(), e.circuit_state()))
            .collect()
    }
}
