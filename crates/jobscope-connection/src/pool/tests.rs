use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jobscope_core::{
    Connection, JobscopeError, QueryResult, Result, StatementResult, Transaction, Value,
};
use pretty_assertions::assert_eq;

use super::config::PoolConfig;
use super::pool::{ConnectionFactory, ConnectionPool};
use super::stats::PoolStats;

/// Session that only records whether it was closed
struct Session {
    closed: AtomicBool,
    closes: Arc<AtomicUsize>,
    close_fails: Arc<AtomicBool>,
}

#[async_trait]
impl Connection for Session {
    fn driver_name(&self) -> &str {
        "counting"
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult::default())
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Err(JobscopeError::Other("no transactions on counting sessions".into()))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        if self.close_fails.load(Ordering::SeqCst) {
            return Err(JobscopeError::connection("server closed the connection unexpectedly"));
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Sessions {
    opened: AtomicUsize,
    closes: Arc<AtomicUsize>,
    close_fails: Arc<AtomicBool>,
    refuse: AtomicBool,
}

impl Sessions {
    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for Sessions {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(JobscopeError::connection("connection refused"));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(Session {
            closed: AtomicBool::new(false),
            closes: Arc::clone(&self.closes),
            close_fails: Arc::clone(&self.close_fails),
        }))
    }
}

fn pool(config: PoolConfig) -> (ConnectionPool, Arc<Sessions>) {
    let sessions = Arc::new(Sessions::default());
    (ConnectionPool::new(config, Arc::clone(&sessions)), sessions)
}

/// Give detached close tasks a chance to run
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[test]
fn test_default_sizing() {
    let config = PoolConfig::default();
    assert_eq!((config.max_size(), config.max_overflow()), (5, 10));
    assert_eq!(config.capacity(), 15);
    assert_eq!(config.acquire_timeout(), Duration::from_secs(30));
    assert_eq!(config.idle_timeout(), Duration::from_secs(600));
    assert_eq!(config.max_lifetime(), None);
}

#[test]
fn test_builder_overrides_lifecycle() {
    let config = PoolConfig::new(1, 0)
        .with_acquire_timeout(Duration::from_secs(5))
        .with_idle_timeout(Duration::from_secs(60))
        .with_max_lifetime(Duration::from_secs(3600));

    assert_eq!(config.capacity(), 1);
    assert_eq!(config.acquire_timeout(), Duration::from_secs(5));
    assert_eq!(config.idle_timeout(), Duration::from_secs(60));
    assert_eq!(config.max_lifetime(), Some(Duration::from_secs(3600)));
}

#[test]
fn test_zero_max_size_keeps_one_session() {
    assert_eq!(PoolConfig::new(0, 2).max_size(), 1);
    assert_eq!(PoolConfig::new(0, 2).capacity(), 3);
}

#[test]
fn test_stats_arithmetic() {
    let stats = PoolStats::new(3, 4, 2, 15);
    assert_eq!(stats.total(), 7);
    assert_eq!((stats.idle(), stats.active(), stats.waiting()), (3, 4, 2));
    assert_eq!(stats.capacity(), 15);

    let half = PoolStats::new(0, 5, 0, 10);
    assert!((half.utilization() - 0.5).abs() < 0.001);
    assert!(!half.is_saturated());
    assert!(PoolStats::new(0, 10, 3, 10).is_saturated());

    let empty = PoolStats::default();
    assert_eq!(empty.utilization(), 0.0);
    assert!(!empty.is_saturated());
}

#[tokio::test]
async fn test_nothing_opens_before_first_get() {
    let (pool, sessions) = pool(PoolConfig::default());
    assert_eq!(sessions.opened(), 0);
    assert_eq!(pool.stats().total(), 0);
}

#[tokio::test]
async fn test_released_session_is_reused() {
    let (pool, sessions) = pool(PoolConfig::new(2, 0));

    let first = pool.get().await.unwrap();
    assert_eq!(first.driver_name(), "counting");
    assert_eq!(pool.stats().active(), 1);
    drop(first);

    assert_eq!(pool.stats(), PoolStats::new(1, 0, 0, 2));
    let _second = pool.get().await.unwrap();
    assert_eq!(sessions.opened(), 1);
}

#[tokio::test]
async fn test_overflow_sessions_are_not_kept() {
    let (pool, sessions) = pool(PoolConfig::new(2, 2));

    let held: Vec<_> = checkout_many(&pool, 4).await;
    assert_eq!(pool.stats().active(), 4);
    assert_eq!(sessions.opened(), 4);

    drop(held);
    settle().await;

    assert_eq!(pool.stats(), PoolStats::new(2, 0, 0, 4));
    assert_eq!(sessions.closed(), 2);
}

async fn checkout_many(pool: &ConnectionPool, n: usize) -> Vec<super::PooledConnection> {
    let mut held = Vec::with_capacity(n);
    for _ in 0..n {
        held.push(pool.get().await.unwrap());
    }
    held
}

#[tokio::test(start_paused = true)]
async fn test_get_times_out_beyond_capacity() {
    let (pool, _sessions) =
        pool(PoolConfig::new(1, 1).with_acquire_timeout(Duration::from_millis(100)));
    let _held = checkout_many(&pool, 2).await;

    let Err(err) = pool.get().await else {
        panic!("a third session exceeds size plus overflow");
    };
    assert!(matches!(err, JobscopeError::Timeout(_)), "{err}");
    assert_eq!(pool.stats().waiting(), 0);
}

#[tokio::test]
async fn test_waiter_gets_the_released_session() {
    let (pool, sessions) = pool(PoolConfig::new(1, 0));

    let first = pool.get().await.unwrap();
    let waiter = tokio::spawn({
        let pool = pool.clone();
        async move { pool.get().await.map(|_| ()) }
    });
    settle().await;
    assert_eq!(pool.stats().waiting(), 1);

    drop(first);
    waiter.await.unwrap().unwrap();
    assert_eq!(sessions.opened(), 1);
}

#[tokio::test]
async fn test_refused_session_leaves_counters_clean() {
    let (pool, sessions) = pool(PoolConfig::default());
    sessions.refuse.store(true, Ordering::SeqCst);

    let Err(err) = pool.get().await else {
        panic!("factory refuses every session");
    };
    assert!(matches!(err, JobscopeError::Connection { .. }));
    assert_eq!(pool.stats(), PoolStats::new(0, 0, 0, 15));
}

#[tokio::test(start_paused = true)]
async fn test_stale_idle_session_is_replaced() {
    let (pool, sessions) = pool(PoolConfig::new(1, 0).with_idle_timeout(Duration::from_secs(1)));

    drop(pool.get().await.unwrap());
    tokio::time::advance(Duration::from_secs(2)).await;

    let _fresh = pool.get().await.unwrap();
    assert_eq!((sessions.opened(), sessions.closed()), (2, 1));
}

#[tokio::test(start_paused = true)]
async fn test_session_past_max_lifetime_is_replaced() {
    let (pool, sessions) = pool(PoolConfig::new(1, 0).with_max_lifetime(Duration::from_secs(30)));

    drop(pool.get().await.unwrap());
    tokio::time::advance(Duration::from_secs(31)).await;

    let _fresh = pool.get().await.unwrap();
    assert_eq!((sessions.opened(), sessions.closed()), (2, 1));
}

#[tokio::test]
async fn test_close_runs_once() {
    let (pool, sessions) = pool(PoolConfig::new(2, 0));
    drop(checkout_many(&pool, 2).await);
    assert_eq!(pool.stats().idle(), 2);

    assert!(pool.close().await);
    assert!(!pool.close().await);
    assert!(pool.is_closed());
    assert_eq!(sessions.closed(), 2);
    assert_eq!(pool.stats().idle(), 0);
    assert!(pool.get().await.is_err());
}

#[tokio::test]
async fn test_session_returned_after_close_is_closed() {
    let (pool, sessions) = pool(PoolConfig::new(2, 0));

    let held = pool.get().await.unwrap();
    pool.close().await;
    drop(held);
    settle().await;

    assert_eq!(sessions.closed(), 1);
    assert_eq!(pool.stats().idle(), 0);
}

#[tokio::test]
async fn test_close_idle_leaves_pool_open() {
    let (pool, _sessions) = pool(PoolConfig::new(2, 0));

    drop(pool.get().await.unwrap());
    pool.close_idle().await;

    assert_eq!(pool.stats().idle(), 0);
    assert!(!pool.is_closed());
    assert!(pool.get().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_failed_close_of_stale_session_does_not_block_checkout() {
    let (pool, sessions) = pool(PoolConfig::new(1, 0).with_idle_timeout(Duration::from_secs(1)));
    sessions.close_fails.store(true, Ordering::SeqCst);

    drop(pool.get().await.unwrap());
    tokio::time::advance(Duration::from_secs(2)).await;

    let fresh = pool.get().await.unwrap();
    assert!(!fresh.is_closed());
    assert_eq!((sessions.opened(), sessions.closed()), (2, 1));

    drop(fresh);
    assert!(pool.close().await);
    assert_eq!(sessions.closed(), 2);
}
