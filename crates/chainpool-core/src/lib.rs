//! chainpool-core: bounded, health-checked pools of full-node RPC clients.
//!
//! # Overview
//!
//! Callers ask for a ready client without knowing which node backs it. The
//! core crate defines:
//!
//! - [`EndpointRegistry`]: discovered node endpoints, round-robin selection
//!   with per-endpoint circuit breakers
//! - [`PooledObjectFactory`]: create / validate / destroy hooks per client type
//! - [`ObjectPool`]: the bounded pool manager (max total, idle bounds,
//!   validation on create, on borrow and while idle)
//! - [`ClientPool`]: the caller-facing handle: retrying borrow,
//!   deadline-bounded borrow, release, heartbeat
//! - [`NodeClient`]: the wire-client trait a pooled object implements
//! - [`EndpointSource`]: where the endpoint list comes from

pub mod acquire;
pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod error;
pub mod factory;
pub mod policy;
pub mod pool;
pub mod request;
pub mod transport;

pub use acquire::{ClientPool, PooledClient};
pub use config::{AcquireConfig, NodeSettings, PoolConfig};
pub use discovery::{EndpointSource, StaticSource};
pub use endpoint::{Endpoint, EndpointId, EndpointRegistry};
pub use error::{PoolError, TransportError};
pub use factory::PooledObjectFactory;
pub use pool::{ObjectPool, PoolStats, Pooled, SweepReport};
pub use request::{JsonRpcRequest, JsonRpcResponse, RpcId};
pub use transport::{NodeClient, RequestIds};
