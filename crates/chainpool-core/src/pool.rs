//! Bounded object pool with validation on create, on borrow and while idle.
//!
//! Capacity is a semaphore with `max_total` permits. Every live object, idle
//! or borrowed, carries one owned permit, so dropping or destroying an
//! object frees its slot for a waiting borrower. The idle deque, counters and
//! the closed flag share one mutex.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::factory::PooledObjectFactory;

/// An object owned by the pool, or by exactly one borrower.
///
/// Derefs to the wrapped object. Hand it back with
/// [`ObjectPool::return_object`] or [`ObjectPool::invalidate_object`];
/// dropping it instead frees its slot and drops the object without the
/// factory's destroy hook.
#[derive(Debug)]
pub struct Pooled<T> {
    object: T,
    id: u64,
    created_at: Instant,
    slot: OwnedSemaphorePermit,
}

impl<T> Pooled<T> {
    /// Pool-unique object id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// When the factory made the object.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    fn into_parts(self) -> (T, OwnedSemaphorePermit) {
        (self.object, self.slot)
    }
}

impl<T> Deref for Pooled<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T> DerefMut for Pooled<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.object
    }
}

/// Pool counters. `idle` and `active` are point-in-time values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub created: u64,
    pub destroyed: u64,
    pub borrowed: u64,
    pub returned: u64,
    pub validation_failures: u64,
    pub idle: usize,
    pub active: usize,
}

/// Outcome of one idle sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub tested: usize,
    pub destroyed: usize,
    pub created: usize,
}

struct IdleEntry<T> {
    obj: Pooled<T>,
    returned_at: Instant,
}

struct PoolState<T> {
    idle: VecDeque<IdleEntry<T>>,
    stats: PoolStats,
    closed: bool,
}

struct PoolInner<F: PooledObjectFactory> {
    factory: F,
    config: PoolConfig,
    state: Mutex<PoolState<F::Object>>,
    slots: Arc<Semaphore>,
    /// Woken whenever an object goes idle or the pool closes.
    returned: Notify,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

/// What a borrow round obtained before activation and validation.
enum Candidate<T> {
    Idle(Pooled<T>),
    Slot(OwnedSemaphorePermit),
}

/// Bounded pool of factory-made objects.
///
/// Cloning is cheap and yields another handle to the same pool.
pub struct ObjectPool<F: PooledObjectFactory> {
    inner: Arc<PoolInner<F>>,
}

impl<F: PooledObjectFactory> Clone for ObjectPool<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: PooledObjectFactory> std::fmt::Debug for ObjectPool<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<F: PooledObjectFactory> ObjectPool<F> {
    /// Create an empty pool. Call [`prepare_pool`](Self::prepare_pool) to pre-warm it.
    pub fn new(factory: F, config: PoolConfig) -> Result<Self, PoolError> {
        config.validate()?;
        tracing::debug!(
            max_total = config.max_total,
            max_idle = config.max_idle,
            min_idle = config.min_idle,
            "created object pool"
        );
        Ok(Self {
            inner: Arc::new(PoolInner {
                factory,
                state: Mutex::new(PoolState {
                    idle: VecDeque::with_capacity(config.max_idle),
                    stats: PoolStats::default(),
                    closed: false,
                }),
                slots: Arc::new(Semaphore::new(config.max_total)),
                returned: Notify::new(),
                next_id: AtomicU64::new(0),
                shutdown: CancellationToken::new(),
                config,
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn factory(&self) -> &F {
        &self.inner.factory
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    pub fn num_idle(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Live objects not sitting idle: borrowed ones plus those being created.
    pub fn num_active(&self) -> usize {
        let state = self.inner.state.lock();
        self.live(&state) - state.idle.len()
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            idle: state.idle.len(),
            active: self.live(&state) - state.idle.len(),
            ..state.stats.clone()
        }
    }

    /// Resolves once the pool has been closed.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await
    }

    fn live(&self, state: &PoolState<F::Object>) -> usize {
        let used = self
            .inner
            .config
            .max_total
            .saturating_sub(self.inner.slots.available_permits());
        used.max(state.idle.len())
    }

    /// Eagerly create idle objects up to `min_idle` so the first borrows skip
    /// connection setup. Returns the number created.
    pub async fn prepare_pool(&self) -> Result<usize, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let created = self.ensure_min_idle().await;
        tracing::info!(created, min_idle = self.inner.config.min_idle, "pool prepared");
        Ok(created)
    }

    /// Borrow an object, waiting while the pool is at `max_total`.
    pub async fn borrow_object(&self) -> Result<Pooled<F::Object>, PoolError> {
        self.borrow_inner().await
    }

    /// Like [`borrow_object`](Self::borrow_object), giving up with
    /// [`PoolError::Cancelled`] as soon as `cancel` fires. Work in flight is
    /// dropped and its slot released.
    pub async fn borrow_object_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Pooled<F::Object>, PoolError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PoolError::Cancelled),
            res = self.borrow_inner() => res,
        }
    }

    async fn borrow_inner(&self) -> Result<Pooled<F::Object>, PoolError> {
        let inner = &self.inner;
        let max_attempts = inner.config.validation_attempts();
        let mut failures = 0u32;

        loop {
            // Registered before inspecting the idle set so a return racing
            // with this round is not missed.
            let notified = inner.returned.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let candidate = match self.take_idle()? {
                Some(obj) => Candidate::Idle(obj),
                None => match Arc::clone(&inner.slots).try_acquire_owned() {
                    Ok(slot) => Candidate::Slot(slot),
                    Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
                    Err(TryAcquireError::NoPermits) => {
                        tokio::select! {
                            _ = &mut notified => continue,
                            slot = Arc::clone(&inner.slots).acquire_owned() => match slot {
                                Ok(slot) => Candidate::Slot(slot),
                                Err(_) => return Err(PoolError::Closed),
                            },
                        }
                    }
                },
            };

            let (mut obj, fresh) = match candidate {
                Candidate::Idle(obj) => (obj, false),
                Candidate::Slot(slot) => (self.create(slot).await?, true),
            };

            if let Err(e) = inner.factory.activate_object(&mut obj.object).await {
                tracing::warn!(object = obj.id, error = %e, "activation failed, destroying object");
                self.destroy(obj).await;
                if fresh {
                    return Err(e);
                }
                continue;
            }

            let validate = if fresh {
                inner.config.test_on_create
            } else {
                inner.config.test_on_borrow
            };
            if validate && !inner.factory.validate_object(&obj.object).await {
                failures += 1;
                inner.state.lock().stats.validation_failures += 1;
                tracing::warn!(object = obj.id, fresh, failures, "validation failed, destroying object");
                self.destroy(obj).await;
                if failures >= max_attempts {
                    return Err(PoolError::ValidationFailed { attempts: failures });
                }
                continue;
            }

            {
                let mut state = inner.state.lock();
                if !state.closed {
                    state.stats.borrowed += 1;
                    drop(state);
                    tracing::trace!(object = obj.id, fresh, "object borrowed");
                    return Ok(obj);
                }
            }
            self.destroy(obj).await;
            return Err(PoolError::Closed);
        }
    }

    fn take_idle(&self) -> Result<Option<Pooled<F::Object>>, PoolError> {
        let mut state = self.inner.state.lock();
        if state.closed {
            return Err(PoolError::Closed);
        }
        let entry = if self.inner.config.lifo {
            state.idle.pop_back()
        } else {
            state.idle.pop_front()
        };
        Ok(entry.map(|e| e.obj))
    }

    async fn create(&self, slot: OwnedSemaphorePermit) -> Result<Pooled<F::Object>, PoolError> {
        let object = match self.inner.factory.make_object().await {
            Ok(object) => object,
            Err(e) => {
                tracing::warn!(error = %e, "failed to create pool object");
                return Err(e);
            }
        };
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.state.lock().stats.created += 1;
        tracing::debug!(object = id, "created pool object");
        Ok(Pooled {
            object,
            id,
            created_at: Instant::now(),
            slot,
        })
    }

    async fn destroy(&self, obj: Pooled<F::Object>) {
        let id = obj.id;
        let (object, slot) = obj.into_parts();
        self.inner.factory.destroy_object(object).await;
        self.inner.state.lock().stats.destroyed += 1;
        drop(slot);
        tracing::debug!(object = id, "destroyed pool object");
    }

    /// Hand a borrowed object back. Idle objects beyond `max_idle` are
    /// destroyed, oldest first. After close the object is destroyed and
    /// [`PoolError::Closed`] returned.
    pub async fn return_object(&self, mut obj: Pooled<F::Object>) -> Result<(), PoolError> {
        if self.is_closed() {
            self.destroy(obj).await;
            return Err(PoolError::Closed);
        }
        if let Err(e) = self.inner.factory.passivate_object(&mut obj.object).await {
            self.destroy(obj).await;
            return Err(e);
        }

        let evicted = {
            let mut state = self.inner.state.lock();
            if state.closed {
                None
            } else {
                state.stats.returned += 1;
                state.idle.push_back(IdleEntry {
                    obj,
                    returned_at: Instant::now(),
                });
                Some(Self::drain_excess(&mut state, self.inner.config.max_idle))
            }
        };

        match evicted {
            Some(evicted) => {
                self.inner.returned.notify_waiters();
                for obj in evicted {
                    self.destroy(obj).await;
                }
                Ok(())
            }
            // closed between the check above and taking the lock
            None => Err(PoolError::Closed),
        }
    }

    fn drain_excess(state: &mut PoolState<F::Object>, max_idle: usize) -> Vec<Pooled<F::Object>> {
        let excess = state.idle.len().saturating_sub(max_idle);
        state.idle.drain(..excess).map(|e| e.obj).collect()
    }

    /// Destroy a borrowed object unconditionally. The handle is consumed, so
    /// the object can never be returned to the idle set.
    pub async fn invalidate_object(&self, obj: Pooled<F::Object>) {
        tracing::debug!(object = obj.id, "invalidating object");
        self.destroy(obj).await;
    }

    /// Create idle objects until `min_idle` is met, capacity runs out, a
    /// creation fails, or validation has failed `validation_attempts` times.
    /// An object that fails validation is destroyed and another one made, so
    /// a dead endpoint does not stall the top-up for the healthy ones.
    async fn ensure_min_idle(&self) -> usize {
        let inner = &self.inner;
        let max_failures = inner.config.validation_attempts();
        let mut failures = 0u32;
        let mut created = 0;
        loop {
            {
                let state = inner.state.lock();
                if state.closed || state.idle.len() >= inner.config.min_idle {
                    break;
                }
            }
            let Ok(slot) = Arc::clone(&inner.slots).try_acquire_owned() else {
                break;
            };
            let obj = match self.create(slot).await {
                Ok(obj) => obj,
                Err(_) => break,
            };
            if inner.config.test_on_create && !inner.factory.validate_object(&obj.object).await {
                failures += 1;
                inner.state.lock().stats.validation_failures += 1;
                tracing::warn!(object = obj.id, failures, "new idle object failed validation");
                self.destroy(obj).await;
                if failures >= max_failures {
                    break;
                }
                continue;
            }

            let rejected = {
                let mut state = inner.state.lock();
                if state.closed {
                    Some(obj)
                } else {
                    state.idle.push_back(IdleEntry {
                        obj,
                        returned_at: Instant::now(),
                    });
                    None
                }
            };
            match rejected {
                Some(obj) => {
                    self.destroy(obj).await;
                    break;
                }
                None => {
                    created += 1;
                    inner.returned.notify_waiters();
                }
            }
        }
        created
    }

    /// Validate idle objects (when `test_while_idle`), destroy failures, and
    /// top the idle set back up to `min_idle`.
    pub async fn sweep_idle(&self) -> SweepReport {
        let inner = &self.inner;
        let mut report = SweepReport::default();

        if inner.config.test_while_idle {
            let batch: Vec<IdleEntry<F::Object>> = {
                let mut state = inner.state.lock();
                if state.closed {
                    return report;
                }
                state.idle.drain(..).collect()
            };

            let mut survivors = Vec::with_capacity(batch.len());
            for entry in batch {
                report.tested += 1;
                if inner.factory.validate_object(&entry.obj.object).await {
                    survivors.push(entry);
                } else {
                    inner.state.lock().stats.validation_failures += 1;
                    tracing::warn!(
                        object = entry.obj.id,
                        age_ms = entry.obj.created_at().elapsed().as_millis() as u64,
                        idle_ms = entry.returned_at.elapsed().as_millis() as u64,
                        "idle object failed validation"
                    );
                    self.destroy(entry.obj).await;
                    report.destroyed += 1;
                }
            }

            let rejected = {
                let mut state = inner.state.lock();
                if state.closed {
                    survivors.into_iter().map(|e| e.obj).collect()
                } else {
                    // survivors are older than anything returned during the sweep
                    for entry in survivors.into_iter().rev() {
                        state.idle.push_front(entry);
                    }
                    Self::drain_excess(&mut state, inner.config.max_idle)
                }
            };
            inner.returned.notify_waiters();
            for obj in rejected {
                self.destroy(obj).await;
            }
        }

        report.created = self.ensure_min_idle().await;
        if report.destroyed > 0 || report.created > 0 {
            tracing::info!(
                tested = report.tested,
                destroyed = report.destroyed,
                created = report.created,
                "idle sweep finished"
            );
        }
        report
    }

    /// Spawn the background idle sweep. Returns `None` when
    /// `idle_sweep_interval` is unset. The task stops when the pool closes
    /// or every handle is dropped.
    pub fn start_idle_sweeper(&self) -> Option<JoinHandle<()>> {
        let interval = self.inner.config.idle_sweep_interval?;
        let weak: Weak<PoolInner<F>> = Arc::downgrade(&self.inner);
        let shutdown = self.inner.shutdown.clone();

        Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = shutdown.cancelled() => break,
                }
                let Some(inner) = weak.upgrade() else { break };
                ObjectPool { inner }.sweep_idle().await;
            }
            tracing::debug!("idle sweeper stopped");
        }))
    }

    /// Close the pool: reject further operations, fail pending borrows, and
    /// destroy every idle object. Borrowed objects are destroyed when they
    /// come back.
    pub async fn close(&self) {
        let idle: Vec<IdleEntry<F::Object>> = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.inner.shutdown.cancel();
        self.inner.slots.close();
        self.inner.returned.notify_waiters();

        let destroyed = idle.len();
        futures::future::join_all(idle.into_iter().map(|e| self.destroy(e.obj))).await;
        tracing::info!(destroyed, "pool closed");
    }
}
