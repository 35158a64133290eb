//! PostgreSQL driver implementation

use async_trait::async_trait;
use jobscope_core::{Connection, ConnectionConfig, DatabaseDriver, Result};
use std::sync::Arc;

use crate::PostgresConnection;

/// Quote an identifier for use in PostgreSQL statements.
///
/// Embedded double quotes are doubled, so names that are not plain
/// identifiers (mixed case, hyphens, quotes) survive intact.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// PostgreSQL database driver
pub struct PostgresDriver;

impl PostgresDriver {
    /// Create a new PostgreSQL driver instance
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL driver initialized");
        Self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    #[tracing::instrument(skip(self, config), fields(host = config.host(), database = config.database()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        config.validate()?;
        let conn = PostgresConnection::connect(config).await?;
        Ok(Arc::new(conn))
    }

    fn create_database_sql(&self, name: &str) -> String {
        format!("CREATE DATABASE {}", quote_identifier(name))
    }

    fn server_version_query(&self) -> &'static str {
        "SELECT version()"
    }

    fn table_count_query(&self) -> &'static str {
        "SELECT COUNT(*) FROM information_schema.tables \
         WHERE table_schema = 'public' AND table_type = 'BASE TABLE'"
    }

    fn table_info_query(&self) -> &'static str {
        r#"
        SELECT
            c.table_name::text,
            c.column_name::text,
            c.data_type::text,
            c.is_nullable::text,
            c.column_default::text,
            c.ordinal_position::int4
        FROM information_schema.columns c
        JOIN information_schema.tables t
          ON t.table_schema = c.table_schema
         AND t.table_name = c.table_name
        WHERE c.table_schema = 'public'
          AND t.table_type = 'BASE TABLE'
        ORDER BY c.table_name, c.ordinal_position
        "#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("job_market"), "\"job_market\"");
        assert_eq!(quote_identifier("Job-Market"), "\"Job-Market\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_create_database_sql() {
        let driver = PostgresDriver::new();
        assert_eq!(
            driver.create_database_sql("job_market"),
            "CREATE DATABASE \"job_market\""
        );
    }

    #[test]
    fn test_driver_identity() {
        let driver = PostgresDriver::default();
        assert_eq!(driver.name(), "postgres");
        assert_eq!(driver.admin_database(), "postgres");
        assert_eq!(driver.liveness_probe(), "SELECT 1");
    }

    #[test]
    fn test_introspection_queries_target_public_schema() {
        let driver = PostgresDriver::new();
        assert!(driver.table_count_query().contains("table_schema = 'public'"));
        assert!(driver.table_count_query().contains("BASE TABLE"));
        let info = driver.table_info_query();
        assert!(info.contains("ORDER BY c.table_name, c.ordinal_position"));
        assert!(info.contains("c.is_nullable"));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_config_before_dialing() {
        let driver = PostgresDriver::new();
        let config = ConnectionConfig::new("", "jobs", "job_market");
        let err = match driver.connect(&config).await {
            Ok(_) => panic!("expected configuration error"),
            Err(err) => err,
        };
        assert!(matches!(err, jobscope_core::JobscopeError::Configuration(_)));
    }
}
