//! The pooled connection handle shared by all callers of a manager

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use jobscope_core::{
    ConnectionConfig, DatabaseDriver, QueryResult, Result, StatementResult, Transaction, Value,
};
use uuid::Uuid;

use crate::pool::{ConnectionPool, DriverConnectionFactory, PoolConfig, PoolStats, PooledConnection};

/// A bounded pool of sessions to one database.
///
/// Clones are cheap and share the same pool; the `id` identifies the
/// underlying pool, so two clones compare equal.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    pool: ConnectionPool,
    descriptor: Arc<str>,
}

impl ConnectionHandle {
    /// Build a handle for `config`. No session is opened yet.
    pub fn open(driver: Arc<dyn DatabaseDriver>, config: &ConnectionConfig, pool: PoolConfig) -> Self {
        let descriptor: Arc<str> = Arc::from(config.masked_descriptor());
        let factory = DriverConnectionFactory::new(driver, config.clone());
        let id = Uuid::new_v4();
        tracing::debug!(handle_id = %id, descriptor = %descriptor, "created connection handle");
        Self {
            id,
            pool: ConnectionPool::new(pool, factory),
            descriptor,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Descriptor with the password masked
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Check out a session for several calls in a row
    pub async fn acquire(&self) -> Result<PooledConnection> {
        self.pool.get().await
    }

    /// Run a query on any free session
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let conn = self.acquire().await?;
        conn.query(sql, params).await
    }

    /// Run a statement on any free session
    pub async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let conn = self.acquire().await?;
        conn.execute(sql, params).await
    }

    /// Begin a transaction. Its session stays checked out until commit or rollback.
    pub async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        let conn = self.acquire().await?;
        let inner = conn.begin_transaction().await?;
        Ok(Box::new(PooledTransaction { inner, _conn: conn }))
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn pool_config(&self) -> &PoolConfig {
        self.pool.config()
    }

    /// Close every session. Returns `false` when the handle was already closed.
    pub async fn close(&self) -> bool {
        let closed = self.pool.close().await;
        if closed {
            tracing::debug!(handle_id = %self.id, "connection handle closed");
        }
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Transaction that keeps its pooled session checked out
struct PooledTransaction {
    inner: Box<dyn Transaction>,
    _conn: PooledConnection,
}

#[async_trait]
impl Transaction for PooledTransaction {
    async fn commit(self: Box<Self>) -> Result<()> {
        let Self { inner, _conn } = *self;
        inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let Self { inner, _conn } = *self;
        inner.rollback().await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.inner.query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.inner.execute(sql, params).await
    }
}
