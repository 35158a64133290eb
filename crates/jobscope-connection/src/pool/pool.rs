//! Connection pool implementation

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use jobscope_core::{Connection, ConnectionConfig, DatabaseDriver, JobscopeError, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Factory trait for creating new sessions
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a new session
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Check that an idle session is still usable before handing it out
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// Opens sessions through a driver with a fixed, already resolved configuration
pub struct DriverConnectionFactory {
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
}

impl DriverConnectionFactory {
    pub fn new(driver: Arc<dyn DatabaseDriver>, config: ConnectionConfig) -> Self {
        Self { driver, config }
    }
}

#[async_trait]
impl ConnectionFactory for DriverConnectionFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        tracing::debug!(target_db = %self.config, "opening pooled session");
        self.driver.connect(&self.config).await
    }
}

async fn discard(connection: &dyn Connection, reason: &str) {
    if let Err(e) = connection.close().await {
        tracing::warn!(error = %e, reason, "failed to close session");
    }
}

struct IdleConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    last_used_at: Instant,
}

/// Close a session from a synchronous context.
///
/// Outside a runtime the session is only dropped, which still tears down the
/// driver's socket task.
fn close_detached(connection: Arc<dyn Connection>) {
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn(async move {
                if let Err(e) = connection.close().await {
                    tracing::warn!(error = %e, "failed to close released session");
                }
            });
        }
        Err(_) => drop(connection),
    }
}

struct PoolShared {
    config: PoolConfig,
    factory: Arc<dyn ConnectionFactory>,
    idle: Mutex<VecDeque<IdleConnection>>,
    /// Admission control: `max_size + max_overflow` permits
    semaphore: Arc<Semaphore>,
    active_count: AtomicUsize,
    waiting_count: AtomicUsize,
    closed: AtomicBool,
}

impl PoolShared {
    /// Pop idle sessions until one passes the lifetime, idle and validity checks
    async fn take_idle(&self) -> Option<IdleConnection> {
        loop {
            let next = self.idle.lock().pop_front();
            let mut idle = next?;

            if let Some(max_lifetime) = self.config.max_lifetime() {
                if idle.created_at.elapsed() > max_lifetime {
                    tracing::debug!("recycling session past its max lifetime");
                    discard(&*idle.connection, "max lifetime").await;
                    continue;
                }
            }

            if idle.last_used_at.elapsed() > self.config.idle_timeout() {
                tracing::debug!("closing session idle past the timeout");
                discard(&*idle.connection, "idle timeout").await;
                continue;
            }

            if !self.factory.validate(&*idle.connection).await {
                discard(&*idle.connection, "failed validation").await;
                continue;
            }

            idle.last_used_at = Instant::now();
            return Some(idle);
        }
    }

    fn release(&self, connection: Arc<dyn Connection>, created_at: Instant) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);

        if connection.is_closed() {
            return;
        }

        let mut idle = self.idle.lock();
        if self.closed.load(Ordering::SeqCst) {
            drop(idle);
            close_detached(connection);
            return;
        }

        // Only max_size sessions are kept between uses; the rest are overflow.
        if idle.len() >= self.config.max_size() {
            drop(idle);
            tracing::debug!("closing overflow session on release");
            close_detached(connection);
            return;
        }

        idle.push_back(IdleConnection {
            connection,
            created_at,
            last_used_at: Instant::now(),
        });
    }
}

/// A bounded pool of database sessions
///
/// Cheap to clone; clones share the same sessions. Sessions are returned to
/// the pool when the `PooledConnection` wrapper is dropped.
#[derive(Clone)]
pub struct ConnectionPool {
    shared: Arc<PoolShared>,
}

impl ConnectionPool {
    /// Create a pool. No session is opened until the first `get`.
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.capacity()));
        Self {
            shared: Arc::new(PoolShared {
                config,
                factory: Arc::new(factory),
                idle: Mutex::new(VecDeque::new()),
                semaphore,
                active_count: AtomicUsize::new(0),
                waiting_count: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Check out a session
    ///
    /// Reuses an idle session when one is usable, otherwise opens a new one.
    /// Waits for a free slot while `max_size + max_overflow` sessions are in
    /// use, failing with a timeout error after the acquire timeout.
    pub async fn get(&self) -> Result<PooledConnection> {
        if self.is_closed() {
            return Err(JobscopeError::connection("connection pool is closed"));
        }

        self.shared.waiting_count.fetch_add(1, Ordering::SeqCst);
        let result = tokio::time::timeout(self.shared.config.acquire_timeout(), self.checkout()).await;
        self.shared.waiting_count.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(conn) => conn,
            Err(_) => Err(JobscopeError::Timeout(format!(
                "Timed out waiting for connection (timeout: {:?})",
                self.shared.config.acquire_timeout()
            ))),
        }
    }

    async fn checkout(&self) -> Result<PooledConnection> {
        let permit = Arc::clone(&self.shared.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| JobscopeError::connection("connection pool is closed"))?;

        let (connection, created_at) = match self.shared.take_idle().await {
            Some(idle) => (idle.connection, idle.created_at),
            None => (self.shared.factory.create().await?, Instant::now()),
        };

        self.shared.active_count.fetch_add(1, Ordering::SeqCst);

        Ok(PooledConnection {
            connection,
            created_at,
            pool: Arc::clone(&self.shared),
            _permit: permit,
        })
    }

    /// Get current pool statistics
    pub fn stats(&self) -> PoolStats {
        let idle = self.shared.idle.lock().len();
        PoolStats::new(
            idle,
            self.shared.active_count.load(Ordering::SeqCst),
            self.shared.waiting_count.load(Ordering::SeqCst),
            self.shared.config.capacity(),
        )
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Close all idle sessions, keeping the pool usable
    pub async fn close_idle(&self) {
        let sessions: Vec<_> = self.shared.idle.lock().drain(..).collect();
        for idle in sessions {
            discard(&*idle.connection, "close_idle").await;
        }
    }

    /// Close the pool.
    ///
    /// Idle sessions are closed now; sessions still checked out are closed
    /// when released. Waiting and later callers get a connection error.
    /// Returns `false` when the pool was already closed.
    pub async fn close(&self) -> bool {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.shared.semaphore.close();

        let sessions: Vec<_> = self.shared.idle.lock().drain(..).collect();
        tracing::debug!(idle = sessions.len(), "closing connection pool");
        for idle in sessions {
            discard(&*idle.connection, "pool closed").await;
        }
        true
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

/// A session borrowed from the pool
///
/// When dropped, the session is returned to the pool or closed if the pool
/// already holds `max_size` idle sessions.
pub struct PooledConnection {
    connection: Arc<dyn Connection>,
    created_at: Instant,
    pool: Arc<PoolShared>,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.connection.as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        // Runs before the permit field drops, so a waiter sees the idle session.
        self.pool.release(Arc::clone(&self.connection), self.created_at);
    }
}
