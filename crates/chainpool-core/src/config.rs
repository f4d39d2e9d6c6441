//! Pool sizing, validation and acquisition settings.

use std::time::Duration;

use serde::Deserialize;

use crate::error::PoolError;
use crate::policy::RetryConfig;

/// Configuration for [`ObjectPool`](crate::pool::ObjectPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Hard ceiling on live objects (idle + borrowed).
    pub max_total: usize,
    /// Idle objects beyond this are destroyed on return.
    pub max_idle: usize,
    /// Idle floor; pre-warmed at startup and restored by the idle sweep.
    pub min_idle: usize,
    /// Validate an idle object before handing it out.
    pub test_on_borrow: bool,
    /// Validate a freshly created object before handing it out.
    pub test_on_create: bool,
    /// Validate idle objects during the background sweep.
    pub test_while_idle: bool,
    /// Borrow the most recently returned idle object first.
    pub lifo: bool,
    /// Interval of the background idle sweep; `None` disables it.
    pub idle_sweep_interval: Option<Duration>,
    /// Cap on destroy-and-retry rounds inside one borrow or one idle top-up;
    /// `None` means `max_total`.
    pub max_validation_attempts: Option<u32>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_total: 8,
            max_idle: 8,
            min_idle: 0,
            test_on_borrow: false,
            test_on_create: false,
            test_while_idle: false,
            lifo: true,
            idle_sweep_interval: None,
            max_validation_attempts: None,
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.max_total == 0 {
            return Err(PoolError::Config("max_total must be greater than 0".into()));
        }
        if self.min_idle > self.max_idle {
            return Err(PoolError::Config(format!(
                "min_idle ({}) must not exceed max_idle ({})",
                self.min_idle, self.max_idle
            )));
        }
        if self.max_idle > self.max_total {
            return Err(PoolError::Config(format!(
                "max_idle ({}) must not exceed max_total ({})",
                self.max_idle, self.max_total
            )));
        }
        if matches!(self.idle_sweep_interval, Some(d) if d.is_zero()) {
            return Err(PoolError::Config("idle_sweep_interval must be non-zero".into()));
        }
        Ok(())
    }

    pub(crate) fn validation_attempts(&self) -> u32 {
        self.max_validation_attempts
            .unwrap_or(self.max_total.min(u32::MAX as usize) as u32)
            .max(1)
    }
}

/// Configuration for [`ClientPool`](crate::acquire::ClientPool).
#[derive(Debug, Clone)]
pub struct AcquireConfig {
    /// Backoff between failed borrow attempts in `get_client`.
    pub retry: RetryConfig,
    /// Ignore `retry.max_retries` and keep trying until the pool closes.
    pub retry_forever: bool,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::fixed(Duration::from_secs(3), 3),
            retry_forever: true,
        }
    }
}

/// Process-level node pool settings, loaded from a JSON config file.
///
/// ```json
/// { "chain_id": "irishub_1", "max_connection_num": 100, "init_connection_num": 5 }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSettings {
    pub chain_id: String,
    /// Maps to `max_total`.
    pub max_connection_num: usize,
    /// Maps to both `max_idle` and `min_idle`.
    pub init_connection_num: usize,
    /// Fixed endpoint list; skips remote discovery when set.
    #[serde(default)]
    pub endpoints: Option<String>,
    /// Remote endpoint list URL, `{chain_id}` is substituted.
    #[serde(default)]
    pub discovery_url: Option<String>,
    #[serde(default = "default_validation_timeout_ms")]
    pub validation_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// `0` disables the idle sweep.
    #[serde(default = "default_idle_sweep_secs")]
    pub idle_sweep_secs: u64,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    /// Bound on `get_client` retries; absent means retry until closed.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

fn default_validation_timeout_ms() -> u64 {
    5_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_idle_sweep_secs() -> u64 {
    30
}

fn default_retry_interval_ms() -> u64 {
    3_000
}

impl NodeSettings {
    pub fn new(chain_id: impl Into<String>, max_connection_num: usize, init_connection_num: usize) -> Self {
        Self {
            chain_id: chain_id.into(),
            max_connection_num,
            init_connection_num,
            endpoints: None,
            discovery_url: None,
            validation_timeout_ms: default_validation_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            idle_sweep_secs: default_idle_sweep_secs(),
            retry_interval_ms: default_retry_interval_ms(),
            max_retries: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PoolError> {
        serde_json::from_str(json).map_err(|e| PoolError::Config(e.to_string()))
    }

    /// Pool settings: every validation policy on, idle bounds pinned to the
    /// initial connection count.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_total: self.max_connection_num,
            max_idle: self.init_connection_num,
            min_idle: self.init_connection_num,
            test_on_borrow: true,
            test_on_create: true,
            test_while_idle: true,
            lifo: true,
            idle_sweep_interval: (self.idle_sweep_secs > 0)
                .then(|| Duration::from_secs(self.idle_sweep_secs)),
            max_validation_attempts: None,
        }
    }

    pub fn acquire_config(&self) -> AcquireConfig {
        let interval = Duration::from_millis(self.retry_interval_ms);
        AcquireConfig {
            retry: RetryConfig::fixed(interval, self.max_retries.unwrap_or(0)),
            retry_forever: self.max_retries.is_none(),
        }
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
