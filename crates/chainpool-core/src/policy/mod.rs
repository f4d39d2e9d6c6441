//! Reliability policies used by the pool.
//!
//! - [`RetryPolicy`] schedules re-attempts of a failed borrow.
//! - [`CircuitBreaker`] takes repeatedly failing endpoints out of rotation.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{RetryConfig, RetryPolicy};
