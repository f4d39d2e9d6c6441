//! Caller-facing acquisition API on top of [`ObjectPool`].
//!
//! `ClientPool` is the handle the application's composition root owns and
//! passes to consumers. It adds retry with backoff, deadline-bounded
//! borrowing, log-only release, and the heartbeat probe.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::AcquireConfig;
use crate::error::{PoolError, TransportError};
use crate::factory::PooledObjectFactory;
use crate::policy::RetryPolicy;
use crate::pool::{ObjectPool, PoolStats, Pooled};
use crate::transport::NodeClient;

/// A client borrowed from a [`ClientPool`].
pub type PooledClient<F> = Pooled<<F as PooledObjectFactory>::Object>;

/// Shared handle to the process's node client pool.
pub struct ClientPool<F: PooledObjectFactory> {
    pool: ObjectPool<F>,
    retry: RetryPolicy,
    retry_forever: bool,
}

impl<F: PooledObjectFactory> Clone for ClientPool<F> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            retry: self.retry.clone(),
            retry_forever: self.retry_forever,
        }
    }
}

impl<F: PooledObjectFactory> std::fmt::Debug for ClientPool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientPool")
            .field("pool", &self.pool)
            .field("retry", &self.retry)
            .field("retry_forever", &self.retry_forever)
            .finish()
    }
}

impl<F: PooledObjectFactory> ClientPool<F> {
    pub fn new(pool: ObjectPool<F>, config: AcquireConfig) -> Self {
        Self {
            pool,
            retry: RetryPolicy::new(config.retry),
            retry_forever: config.retry_forever,
        }
    }

    /// The underlying pool manager.
    pub fn pool(&self) -> &ObjectPool<F> {
        &self.pool
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Borrow a client, backing off and retrying on failure.
    ///
    /// Only [retryable](PoolError::is_retryable) errors are retried; anything
    /// else, including [`PoolError::Closed`], is returned at once. With
    /// `retry_forever` transient errors never surface; otherwise the last one
    /// is returned after `max_retries` retries.
    pub async fn get_client(&self) -> Result<PooledClient<F>, PoolError> {
        let mut attempt = 0u32;
        loop {
            let err = match self.pool.borrow_object().await {
                Ok(client) => return Ok(client),
                Err(e) if !e.is_retryable() => {
                    if !matches!(e, PoolError::Closed) {
                        tracing::error!(error = %e, "get_client failed, not retryable");
                    }
                    return Err(e);
                }
                Err(e) => e,
            };

            attempt = attempt.saturating_add(1);
            let delay = if self.retry_forever {
                Some(self.retry.backoff(attempt))
            } else {
                self.retry.next_delay(attempt)
            };
            let Some(delay) = delay else {
                tracing::error!(attempt, error = %err, "get_client giving up");
                return Err(err);
            };

            tracing::error!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "get_client failed, retrying"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.pool.closed() => return Err(PoolError::Closed),
            }
        }
    }

    /// Borrow a client, giving up after `timeout`.
    ///
    /// The borrow runs on its own task and reports over a single-use
    /// channel. When the timer wins, the channel is closed and the task
    /// cancelled. A client the task obtained anyway goes back to the pool:
    /// either the task's send fails and it returns the client itself, or the
    /// client was sent just before the close and is drained here.
    pub async fn get_client_with_timeout(
        &self,
        timeout: Duration,
    ) -> Result<PooledClient<F>, PoolError> {
        let (tx, mut rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let attempt = {
            let pool = self.pool.clone();
            let cancel = cancel.clone();
            async move {
                let res = pool.borrow_object_cancellable(&cancel).await;
                if let Err(Ok(orphan)) = tx.send(res) {
                    tracing::debug!(object = orphan.id(), "borrow finished after deadline, returning client");
                    if let Err(e) = pool.return_object(orphan).await {
                        tracing::error!(error = %e, "failed to return orphaned client");
                    }
                }
            }
        };
        tokio::spawn(attempt);

        tokio::select! {
            biased;
            res = &mut rx => res.unwrap_or(Err(PoolError::Cancelled)),
            _ = tokio::time::sleep(timeout) => {
                rx.close();
                cancel.cancel();
                if let Ok(Ok(late)) = rx.try_recv() {
                    tracing::debug!(object = late.id(), "borrow finished at deadline, returning client");
                    if let Err(e) = self.pool.return_object(late).await {
                        tracing::error!(error = %e, "failed to return late client");
                    }
                }
                Err(PoolError::Timeout { ms: timeout.as_millis() as u64 })
            }
        }
    }

    /// Give a client back. Failures are logged; the client is gone either way.
    pub async fn release(&self, client: PooledClient<F>) {
        if let Err(e) = self.pool.return_object(client).await {
            tracing::error!(error = %e, "failed to release client");
        }
    }

    /// Discard a client the caller knows is broken.
    pub async fn invalidate(&self, client: PooledClient<F>) {
        self.pool.invalidate_object(client).await;
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl<F> ClientPool<F>
where
    F: PooledObjectFactory,
    F::Object: NodeClient,
{
    /// Probe the endpoint behind a borrowed client. The raw error is
    /// returned so the caller can decide whether to [`invalidate`](Self::invalidate).
    pub async fn heart_beat(&self, client: &PooledClient<F>) -> Result<(), TransportError> {
        client.health().await
    }
}
