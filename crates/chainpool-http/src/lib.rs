//! chainpool-http: HTTP JSON-RPC node clients for ChainPool.
//!
//! - [`HttpNodeClient`]: one JSON-RPC session with one full node
//! - [`HttpClientFactory`]: pool factory binding clients to registry endpoints
//! - [`RemoteListSource`]: fetches the comma-separated node list over HTTP
//! - [`init`]: builds a ready [`HttpClientPool`] from [`NodeSettings`](chainpool_core::NodeSettings)
//!
//! # Usage
//! ```rust,no_run
//! use chainpool_core::NodeSettings;
//!
//! # async fn run() -> Result<(), chainpool_core::PoolError> {
//! let mut settings = NodeSettings::new("irishub_1", 10, 2);
//! settings.endpoints = Some("http://node-a:26657,http://node-b:26657".into());
//!
//! let pool = chainpool_http::init(&settings).await?;
//! let client = pool.get_client().await?;
//! if pool.heart_beat(&client).await.is_err() {
//!     pool.invalidate(client).await;
//! } else {
//!     pool.release(client).await;
//! }
//! pool.close().await;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod client;
pub mod discovery;
pub mod factory;

pub use bootstrap::{discover, init, init_with_source, source_for, HttpClientPool};
pub use client::{HttpClientConfig, HttpNodeClient};
pub use discovery::RemoteListSource;
pub use factory::HttpClientFactory;
