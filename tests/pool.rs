//! Connection pool properties: cap enforcement and slot accounting

use async_trait::async_trait;
use claude_rag::adapters::providers::vector_store::{ConnectionFactory, Pool, PooledConnection};
use claude_rag::domain::error::{Error, Result};
use claude_rag::infrastructure::config::PoolConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct StubConnection {
    tracker: Arc<LiveTracker>,
}

#[derive(Default)]
struct LiveTracker {
    live: AtomicUsize,
    peak: AtomicUsize,
}

impl LiveTracker {
    fn connect(self: &Arc<Self>) {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PooledConnection for StubConnection {
    async fn health_medium(&self) -> Result<()> {
        Ok(())
    }

    async fn health_deep(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) {
        self.tracker.disconnect();
    }
}

struct StubFactory {
    tracker: Arc<LiveTracker>,
    fail: AtomicBool,
    created: AtomicUsize,
}

impl StubFactory {
    fn new(tracker: Arc<LiveTracker>) -> Self {
        Self {
            tracker,
            fail: AtomicBool::new(false),
            created: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ConnectionFactory<StubConnection> for StubFactory {
    async fn create(&self) -> Result<StubConnection> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::ConnectionCreation {
                detail: "backend down".into(),
            });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.tracker.connect();
        Ok(StubConnection {
            tracker: self.tracker.clone(),
        })
    }
}

fn pool_config(max: usize) -> PoolConfig {
    PoolConfig {
        size: max,
        min_size: 1,
        timeout_secs: 5,
        recycle_secs: 3600,
        health_check_interval_secs: 3600,
    }
}

#[tokio::test]
async fn cap_holds_under_concurrent_load() {
    let tracker = Arc::new(LiveTracker::default());
    let factory = Arc::new(StubFactory::new(tracker.clone()));
    let pool = Pool::new(factory, pool_config(3));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire().await.expect("acquire within timeout");
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(conn);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(
        tracker.peak.load(Ordering::SeqCst) <= 3,
        "peak live connections = {}",
        tracker.peak.load(Ordering::SeqCst)
    );

    let metrics = pool.metrics();
    assert_eq!(metrics.acquires, 20);
    assert_eq!(metrics.timeouts, 0);
    assert!(metrics.created <= 3);
    assert!(pool.live_count() <= 3);
}

#[tokio::test]
async fn creation_failure_returns_the_reserved_slot() {
    let tracker = Arc::new(LiveTracker::default());
    let factory = Arc::new(StubFactory::new(tracker.clone()));
    factory.fail.store(true, Ordering::SeqCst);
    let pool = Pool::new(factory.clone(), pool_config(2));

    for _ in 0..5 {
        let err = pool.acquire().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionCreation { .. }));
        // The reservation must be unwound every time.
        assert_eq!(pool.live_count(), 0);
    }

    // Recovery: once creation works, the pool fills normally.
    factory.fail.store(false, Ordering::SeqCst);
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.live_count(), 1);
    drop(conn);
}

#[tokio::test]
async fn exhaustion_times_out_with_pool_exhausted() {
    let tracker = Arc::new(LiveTracker::default());
    let factory = Arc::new(StubFactory::new(tracker));
    let mut config = pool_config(1);
    config.timeout_secs = 1;
    let pool = Pool::new(factory, config);

    let held = pool.acquire().await.unwrap();
    let err = pool.acquire().await.unwrap_err();
    assert!(matches!(err, Error::PoolExhausted { .. }));
    assert!(err.is_transient());
    assert_eq!(pool.metrics().timeouts, 1);
    drop(held);

    // The released slot is acquirable again.
    let _conn = pool.acquire().await.unwrap();
}

#[tokio::test]
async fn released_connections_are_reused() {
    let tracker = Arc::new(LiveTracker::default());
    let factory = Arc::new(StubFactory::new(tracker));
    let pool = Pool::new(factory.clone(), pool_config(4));

    for _ in 0..10 {
        let conn = pool.acquire().await.unwrap();
        drop(conn);
        // Give the release loop a turn.
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.metrics().acquires, 10);
}

#[tokio::test]
async fn broken_connections_are_closed_not_requeued() {
    let tracker = Arc::new(LiveTracker::default());
    let factory = Arc::new(StubFactory::new(tracker.clone()));
    let pool = Pool::new(factory.clone(), pool_config(4));

    let mut conn = pool.acquire().await.unwrap();
    conn.mark_broken();
    drop(conn);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
    assert_eq!(pool.metrics().failed, 1);

    // The next acquire creates a fresh connection.
    let _conn = pool.acquire().await.unwrap();
    assert_eq!(factory.created.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn shutdown_closes_idle_connections() {
    let tracker = Arc::new(LiveTracker::default());
    let factory = Arc::new(StubFactory::new(tracker.clone()));
    let pool = Pool::new(factory, pool_config(2));

    let conn = pool.acquire().await.unwrap();
    drop(conn);
    tokio::time::sleep(Duration::from_millis(20)).await;

    pool.shutdown().await;
    assert_eq!(tracker.live.load(Ordering::SeqCst), 0);
    assert!(pool.acquire().await.is_err());
}
