//! Connection pooling for database sessions
//!
//! A pool keeps up to `max_size` idle sessions and admits up to
//! `max_size + max_overflow` sessions in use at once. Sessions opened beyond
//! the idle capacity are overflow sessions and are closed on release.
//!
//! # Example
//!
//! ```ignore
//! use jobscope_connection::pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(5, 10).with_acquire_timeout(Duration::from_secs(5));
//! let pool = ConnectionPool::new(config, connection_factory);
//! let conn = pool.get().await?;
//! // Use connection...
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod stats;

#[cfg(test)]
mod tests;

pub use config::PoolConfig;
pub use pool::{ConnectionFactory, ConnectionPool, DriverConnectionFactory, PooledConnection};
pub use stats::PoolStats;
