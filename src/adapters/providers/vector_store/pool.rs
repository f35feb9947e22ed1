//! Bounded async connection pool
//!
//! Slots move through Idle → InUse → (Idle | closed) with a hard cap on
//! live connections. The cap is enforced by reserving a slot under the
//! state lock *before* creating the client outside the lock; any creation
//! failure returns the reservation before the error propagates. Violating
//! either half of that rule yields unbounded connections or leaked slots,
//! so the reservation logic lives in exactly one place ([`Pool::acquire`]).
//!
//! Health checks come in three tiers: fast (broken-flag check on release),
//! medium (list collections, run on acquire of an idle slot), and deep
//! (round-trip against the collection, run by the background task on idle
//! slots every `health_check_interval`).

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;

use crate::domain::error::{Error, Result};
use crate::infrastructure::config::PoolConfig;

/// Contract for clients the pool can manage
#[async_trait]
pub trait PooledConnection: Send + Sync + 'static {
    /// Medium health check: a cheap round-trip (< 50 ms target)
    async fn health_medium(&self) -> Result<()>;

    /// Deep health check: a known-collection round-trip (< 200 ms target)
    async fn health_deep(&self) -> Result<()>;

    /// Release any underlying resources
    async fn close(&self);
}

/// Creates new pooled clients
#[async_trait]
pub trait ConnectionFactory<C: PooledConnection>: Send + Sync + 'static {
    /// Create one client; called outside the pool lock
    async fn create(&self) -> Result<C>;
}

struct Slot<C> {
    conn: Arc<C>,
    created_at: Instant,
}

struct PoolState<C> {
    idle: VecDeque<Slot<C>>,
    live_count: usize,
    closed: bool,
}

/// Counter snapshot exposed for status reporting and tests
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct PoolMetrics {
    /// Configured maximum
    pub max_size: usize,
    /// Slots currently idle
    pub idle: usize,
    /// Slots currently checked out
    pub active: usize,
    /// Clients created over the pool lifetime
    pub created: u64,
    /// Clients closed due to age recycling
    pub recycled: u64,
    /// Clients closed due to failed health checks
    pub failed: u64,
    /// Successful acquires
    pub acquires: u64,
    /// Acquire timeouts
    pub timeouts: u64,
    /// Health check failures observed
    pub health_failures: u64,
    /// Acquire latency percentiles in microseconds (p50, p95, p99)
    pub acquire_us: (u64, u64, u64),
}

struct Counters {
    created: AtomicU64,
    recycled: AtomicU64,
    failed: AtomicU64,
    acquires: AtomicU64,
    timeouts: AtomicU64,
    health_failures: AtomicU64,
    latencies_us: Mutex<VecDeque<u64>>,
}

impl Counters {
    fn new() -> Self {
        Self {
            created: AtomicU64::new(0),
            recycled: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            acquires: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            health_failures: AtomicU64::new(0),
            latencies_us: Mutex::new(VecDeque::with_capacity(1024)),
        }
    }

    fn record_latency(&self, elapsed: Duration) {
        let mut window = self
            .latencies_us
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if window.len() == 1024 {
            window.pop_front();
        }
        window.push_back(elapsed.as_micros() as u64);
    }

    fn percentiles(&self) -> (u64, u64, u64) {
        let window = self
            .latencies_us
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if window.is_empty() {
            return (0, 0, 0);
        }
        let mut sorted: Vec<u64> = window.iter().copied().collect();
        sorted.sort_unstable();
        let pick = |q: f64| {
            let idx = ((sorted.len() as f64 - 1.0) * q).round() as usize;
            sorted[idx]
        };
        (pick(0.50), pick(0.95), pick(0.99))
    }
}

enum Released<C> {
    Healthy(Slot<C>),
    Broken(Slot<C>),
}

/// Bounded pool of backend clients
pub struct Pool<C: PooledConnection> {
    factory: Arc<dyn ConnectionFactory<C>>,
    config: PoolConfig,
    state: Mutex<PoolState<C>>,
    available: Notify,
    release_tx: mpsc::UnboundedSender<Released<C>>,
    counters: Counters,
    shutdown: CancellationToken,
}

impl<C: PooledConnection> Pool<C> {
    /// Build a pool and start its release and health background tasks
    pub fn new(factory: Arc<dyn ConnectionFactory<C>>, config: PoolConfig) -> Arc<Self> {
        let (release_tx, release_rx) = mpsc::unbounded_channel();
        let pool = Arc::new(Self {
            factory,
            config,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                live_count: 0,
                closed: false,
            }),
            available: Notify::new(),
            release_tx,
            counters: Counters::new(),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(Self::release_loop(pool.clone(), release_rx));
        tokio::spawn(Self::health_loop(pool.clone()));
        pool
    }

    /// Slot-state access that survives mutex poisoning. A panic in some
    /// other task must not wedge the pool forever; every critical section
    /// here leaves the counters consistent even when interrupted, so the
    /// inner value is safe to keep using.
    fn lock_state(&self) -> std::sync::MutexGuard<'_, PoolState<C>> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Acquire a connection, waiting up to the configured timeout
    pub async fn acquire(self: &Arc<Self>) -> Result<PoolGuard<C>> {
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.timeout_secs);

        loop {
            // Phase 1: take an idle slot or reserve capacity, under the lock.
            let action = {
                let mut state = self.lock_state();
                if state.closed {
                    return Err(Error::internal("pool is shut down"));
                }
                if let Some(slot) = state.idle.pop_front() {
                    Acquired::Idle(slot)
                } else if state.live_count < self.config.size {
                    // Reserve before creating; the creation itself must not
                    // hold the lock.
                    state.live_count += 1;
                    Acquired::Reserved
                } else {
                    Acquired::Full
                }
            };

            match action {
                Acquired::Idle(slot) => {
                    // Recycle old connections instead of handing them out.
                    if slot.created_at.elapsed() >= Duration::from_secs(self.config.recycle_secs) {
                        self.counters.recycled.fetch_add(1, Ordering::Relaxed);
                        self.discard(slot).await;
                        continue;
                    }
                    if let Err(err) = slot.conn.health_medium().await {
                        tracing::warn!(error = %err, "idle connection failed health check");
                        self.counters.health_failures.fetch_add(1, Ordering::Relaxed);
                        self.counters.failed.fetch_add(1, Ordering::Relaxed);
                        self.discard(slot).await;
                        continue;
                    }
                    self.counters.acquires.fetch_add(1, Ordering::Relaxed);
                    self.counters.record_latency(started.elapsed());
                    return Ok(PoolGuard::new(slot, self.release_tx.clone()));
                }
                Acquired::Reserved => match self.factory.create().await {
                    Ok(conn) => {
                        self.counters.created.fetch_add(1, Ordering::Relaxed);
                        self.counters.acquires.fetch_add(1, Ordering::Relaxed);
                        self.counters.record_latency(started.elapsed());
                        let slot = Slot {
                            conn: Arc::new(conn),
                            created_at: Instant::now(),
                        };
                        return Ok(PoolGuard::new(slot, self.release_tx.clone()));
                    }
                    Err(err) => {
                        // Return the reservation before propagating.
                        {
                            let mut state = self.lock_state();
                            state.live_count -= 1;
                        }
                        self.available.notify_one();
                        return Err(Error::ConnectionCreation {
                            detail: err.to_string(),
                        });
                    }
                },
                Acquired::Full => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                        return Err(Error::PoolExhausted {
                            waited_ms: waited.as_millis() as u64,
                        });
                    }
                    let remaining = timeout - waited;
                    tokio::select! {
                        _ = self.available.notified() => {}
                        _ = tokio::time::sleep(remaining) => {
                            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                            return Err(Error::PoolExhausted {
                                waited_ms: timeout.as_millis() as u64,
                            });
                        }
                    }
                }
            }
        }
    }

    async fn discard(&self, slot: Slot<C>) {
        slot.conn.close().await;
        {
            let mut state = self.lock_state();
            state.live_count -= 1;
        }
        self.available.notify_one();
    }

    async fn release_loop(pool: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Released<C>>) {
        while let Some(released) = rx.recv().await {
            match released {
                Released::Healthy(slot)
                    if slot.created_at.elapsed()
                        < Duration::from_secs(pool.config.recycle_secs) =>
                {
                    let is_closed = pool.lock_state().closed;
                    if is_closed {
                        pool.discard(slot).await;
                        continue;
                    }
                    let mut state = pool.lock_state();
                    state.idle.push_back(slot);
                    drop(state);
                    pool.available.notify_one();
                }
                Released::Healthy(slot) => {
                    pool.counters.recycled.fetch_add(1, Ordering::Relaxed);
                    pool.discard(slot).await;
                }
                Released::Broken(slot) => {
                    pool.counters.failed.fetch_add(1, Ordering::Relaxed);
                    pool.discard(slot).await;
                }
            }
        }
    }

    async fn health_loop(pool: Arc<Self>) {
        let interval = Duration::from_secs(pool.config.health_check_interval_secs);
        loop {
            tokio::select! {
                _ = pool.shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            // Sweep current idle slots through a deep health check.
            let slots: Vec<Slot<C>> = {
                let mut state = pool.lock_state();
                state.idle.drain(..).collect()
            };
            let mut healthy = Vec::new();
            for slot in slots {
                match slot.conn.health_deep().await {
                    Ok(()) => healthy.push(slot),
                    Err(err) => {
                        tracing::warn!(error = %err, "deep health check failed, closing slot");
                        pool.counters.health_failures.fetch_add(1, Ordering::Relaxed);
                        pool.counters.failed.fetch_add(1, Ordering::Relaxed);
                        pool.discard(slot).await;
                    }
                }
            }
            {
                let mut state = pool.lock_state();
                for slot in healthy {
                    state.idle.push_back(slot);
                }
            }

            // Top back up to min_size.
            loop {
                let deficit = {
                    let mut state = pool.lock_state();
                    if state.closed || state.live_count >= pool.config.min_size {
                        break;
                    }
                    state.live_count += 1;
                    true
                };
                if deficit {
                    match pool.factory.create().await {
                        Ok(conn) => {
                            pool.counters.created.fetch_add(1, Ordering::Relaxed);
                            let mut state = pool.lock_state();
                            state.idle.push_back(Slot {
                                conn: Arc::new(conn),
                                created_at: Instant::now(),
                            });
                            drop(state);
                            pool.available.notify_one();
                        }
                        Err(err) => {
                            tracing::warn!(error = %err, "failed to replace pooled connection");
                            let mut state = pool.lock_state();
                            state.live_count -= 1;
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Current metrics snapshot
    pub fn metrics(&self) -> PoolMetrics {
        let (idle, live) = {
            let state = self.lock_state();
            (state.idle.len(), state.live_count)
        };
        PoolMetrics {
            max_size: self.config.size,
            idle,
            active: live.saturating_sub(idle),
            created: self.counters.created.load(Ordering::Relaxed),
            recycled: self.counters.recycled.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            acquires: self.counters.acquires.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            health_failures: self.counters.health_failures.load(Ordering::Relaxed),
            acquire_us: self.counters.percentiles(),
        }
    }

    /// Live slot count (checked out + idle); test hook for the cap property
    pub fn live_count(&self) -> usize {
        self.lock_state().live_count
    }

    /// Stop background tasks and close idle connections. Checked-out
    /// connections close as their guards drop.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let slots: Vec<Slot<C>> = {
            let mut state = self.lock_state();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        for slot in slots {
            self.discard(slot).await;
        }
    }
}

enum Acquired<C> {
    Idle(Slot<C>),
    Reserved,
    Full,
}

/// RAII handle to a pooled connection; returns the slot on drop
pub struct PoolGuard<C: PooledConnection> {
    slot: Option<Slot<C>>,
    release_tx: mpsc::UnboundedSender<Released<C>>,
    broken: bool,
}

impl<C: PooledConnection> PoolGuard<C> {
    fn new(slot: Slot<C>, release_tx: mpsc::UnboundedSender<Released<C>>) -> Self {
        Self {
            slot: Some(slot),
            release_tx,
            broken: false,
        }
    }

    /// Mark the connection unusable; it is closed instead of re-queued
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl<C: PooledConnection> std::fmt::Debug for PoolGuard<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGuard")
            .field("broken", &self.broken)
            .finish_non_exhaustive()
    }
}

impl<C: PooledConnection> std::ops::Deref for PoolGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.slot
            .as_ref()
            .expect("slot present until drop")
            .conn
            .as_ref()
    }
}

impl<C: PooledConnection> Drop for PoolGuard<C> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let released = if self.broken {
                Released::Broken(slot)
            } else {
                Released::Healthy(slot)
            };
            // If the release loop is gone the pool is shutting down; the
            // connection is dropped with the message.
            let _ = self.release_tx.send(released);
        }
    }
}
