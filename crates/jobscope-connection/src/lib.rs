//! Jobscope Connection - Connection management for the job-market store
//!
//! This crate owns the lifecycle of the pooled handle to the relational
//! store: lazy opening with retries, credential resolution, one-shot setup
//! (database creation and schema scripts) and diagnostics.

mod credentials;
mod handle;
pub mod health;
mod manager;
pub mod pool;
pub mod retry;
mod script;
mod settings;

#[cfg(test)]
mod test_support;

pub use credentials::{
    ChainedResolver, CredentialResolver, DEFAULT_PASSWORD_ENV, EnvPassword, KEYRING_SERVICE,
    KeyringPassword, NoCredentials, StaticPassword,
};
pub use handle::ConnectionHandle;
pub use health::{
    ConnectionOutcome, ConnectionStatus, HealthStatus, HealthThresholds, PingError, PingResult,
    ping_database,
};
pub use manager::{ConnectionManager, DatabaseCreation, HandleState};
pub use pool::{ConnectionPool, PoolConfig, PoolStats, PooledConnection};
pub use retry::{RetryPolicy, retry_with_policy};
pub use script::{STATEMENT_DELIMITER, ScriptReport, split_statements, statement_preview};
pub use settings::{
    CONFIG_ENV, DEFAULT_DATABASE, DEFAULT_HOST, DEFAULT_SCHEMA_PATH, DEFAULT_USERNAME,
    DatabaseSettings, PoolSettings, RetrySettings, SchemaSettings, Settings,
};
