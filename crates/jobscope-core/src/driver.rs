//! Database driver trait definition

use crate::{Connection, ConnectionConfig, Result, ADMIN_DATABASE};
use async_trait::async_trait;
use std::sync::Arc;

/// Core driver trait that all database drivers must implement
///
/// Besides opening sessions, a driver owns the handful of dialect-specific
/// statements the connection manager issues on its own behalf, so the manager
/// itself never embeds SQL for a particular server.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "postgres")
    fn name(&self) -> &'static str;

    /// Database that always exists and can be used to create others
    fn admin_database(&self) -> &'static str {
        ADMIN_DATABASE
    }

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Trivial query confirming a session is usable
    fn liveness_probe(&self) -> &'static str {
        "SELECT 1"
    }

    /// Statement creating a database with the given name
    fn create_database_sql(&self, name: &str) -> String;

    /// Query returning the server version string in its first column
    fn server_version_query(&self) -> &'static str;

    /// Query returning the number of user tables in its first column
    fn table_count_query(&self) -> &'static str;

    /// Query describing every column of every user table.
    ///
    /// Columns, in order: table name, column name, data type, nullability
    /// (`YES`/`NO`), default expression, ordinal position. Rows are ordered by
    /// table name then ordinal position.
    fn table_info_query(&self) -> &'static str;
}
