//! Connection manager: one lazily opened, shared handle per target database
//! plus the setup and diagnostic operations built on it

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use jobscope_core::{
    ConnectionConfig, DatabaseDriver, JobscopeError, Result, TableColumnInfo, Value,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};

use crate::credentials::{CredentialResolver, EnvPassword, NoCredentials};
use crate::handle::ConnectionHandle;
use crate::health::{ConnectionStatus, ping_database};
use crate::pool::PoolConfig;
use crate::retry::{RetryPolicy, retry_with_policy};
use crate::script::{ScriptReport, run_script};
use crate::settings::{DEFAULT_SCHEMA_PATH, Settings};

/// Whether the manager currently holds a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unopened,
    Open,
}

/// Result of [`ConnectionManager::create_database`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseCreation {
    Created,
    AlreadyExisted,
}

/// Owns the connection parameters and the shared pooled handle.
///
/// Nothing connects until an operation needs the store. The handle slot is
/// guarded by an async mutex held across creation, so concurrent first
/// callers share a single handle and `close` never races `get_handle`.
pub struct ConnectionManager {
    config: ConnectionConfig,
    /// `config` with the password filled in by the resolver
    resolved: OnceCell<ConnectionConfig>,
    driver: Arc<dyn DatabaseDriver>,
    credentials: Arc<dyn CredentialResolver>,
    pool_config: PoolConfig,
    retry_policy: RetryPolicy,
    schema_path: PathBuf,
    handle: Mutex<Option<ConnectionHandle>>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            config,
            resolved: OnceCell::new(),
            driver,
            credentials: Arc::new(NoCredentials),
            pool_config: PoolConfig::default(),
            retry_policy: RetryPolicy::default(),
            schema_path: PathBuf::from(DEFAULT_SCHEMA_PATH),
            handle: Mutex::new(None),
        }
    }

    /// Manager configured from a settings file, reading the password from
    /// the settings' `password_env` variable when the file has none
    pub fn from_settings(settings: &Settings, driver: Arc<dyn DatabaseDriver>) -> Result<Self> {
        Ok(Self::new(settings.connection_config(), driver)
            .with_pool_config(settings.pool_config()?)
            .with_retry_policy(settings.retry_policy())
            .with_schema_path(settings.schema_path())
            .with_credentials(EnvPassword::new(settings.password_env())))
    }

    pub fn with_pool_config(mut self, pool_config: PoolConfig) -> Self {
        self.pool_config = pool_config;
        self
    }

    pub fn with_credentials(mut self, resolver: impl CredentialResolver + 'static) -> Self {
        self.credentials = Arc::new(resolver);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_path = path.into();
        self
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    /// Descriptor with the password masked
    pub fn masked_descriptor(&self) -> String {
        self.current_config().masked_descriptor()
    }

    fn current_config(&self) -> &ConnectionConfig {
        self.resolved.get().unwrap_or(&self.config)
    }

    fn redact(&self, text: &str) -> String {
        self.current_config().redact(text)
    }

    /// Validate the parameters and fill in the password, asking the resolver
    /// at most once per manager
    async fn resolved_config(&self) -> Result<&ConnectionConfig> {
        self.config.validate()?;
        self.resolved
            .get_or_try_init(|| self.resolve_password())
            .await
    }

    async fn resolve_password(&self) -> Result<ConnectionConfig> {
        if self.config.has_password() {
            return Ok(self.config.clone());
        }

        match self.credentials.resolve(&self.config).await? {
            Some(password) => {
                tracing::debug!(resolver = self.credentials.name(), "password resolved");
                Ok(self.config.clone().with_password(password))
            }
            None => {
                tracing::debug!(
                    resolver = self.credentials.name(),
                    "no password available, connecting without one"
                );
                Ok(self.config.clone())
            }
        }
    }

    /// Create the target database from the administrative database.
    ///
    /// An existing database counts as success, so this is safe to repeat.
    #[tracing::instrument(skip(self), fields(database = %self.config.database()))]
    pub async fn create_database(&self) -> Result<DatabaseCreation> {
        let config = self.resolved_config().await?;
        let admin = config.for_database(self.driver.admin_database());
        let name = config.database();

        tracing::info!(admin_database = admin.database(), "creating database");

        let administrative = |e: JobscopeError| match e {
            JobscopeError::Configuration(_) | JobscopeError::Credential(_) => e,
            other => JobscopeError::Administrative(
                config.redact(&format!("failed to create database {}: {}", name, other)),
            ),
        };

        let conn = self.driver.connect(&admin).await.map_err(administrative)?;
        let result = conn.execute(&self.driver.create_database_sql(name), &[]).await;
        if let Err(e) = conn.close().await {
            tracing::warn!(error = %config.redact(&e.to_string()), "failed to close administrative connection");
        }

        match result {
            Ok(_) => {
                tracing::info!("database created");
                Ok(DatabaseCreation::Created)
            }
            Err(e) if e.is_duplicate_database() => {
                tracing::info!("database already exists");
                Ok(DatabaseCreation::AlreadyExisted)
            }
            Err(e) => {
                tracing::error!(error = %config.redact(&e.to_string()), "database creation failed");
                Err(administrative(e))
            }
        }
    }

    /// Return the shared handle, opening it on first use.
    ///
    /// Opening means building a pool and running the liveness probe on one
    /// session. A failed attempt is retried after `retry_delay`, up to
    /// `retry_count` attempts in total (0 counts as 1). Once open, the handle
    /// is returned as-is until [`close`](Self::close) or
    /// [`invalidate`](Self::invalidate).
    #[tracing::instrument(skip(self), fields(retry_delay_ms = retry_delay.as_millis() as u64))]
    pub async fn get_handle(&self, retry_count: u32, retry_delay: Duration) -> Result<ConnectionHandle> {
        self.handle_with(&RetryPolicy::new(retry_count, retry_delay)).await
    }

    /// [`get_handle`](Self::get_handle) with the manager's retry policy
    pub async fn handle(&self) -> Result<ConnectionHandle> {
        self.handle_with(&self.retry_policy).await
    }

    async fn handle_with(&self, policy: &RetryPolicy) -> Result<ConnectionHandle> {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.as_ref() {
            return Ok(handle.clone());
        }

        let config = self.resolved_config().await?;
        let descriptor = config.masked_descriptor();

        let handle = retry_with_policy(policy, |attempt| {
            let descriptor = &descriptor;
            async move {
                tracing::info!(
                    attempt,
                    max_attempts = policy.attempts(),
                    descriptor = %descriptor,
                    "opening connection handle"
                );
                // Scrubbed before the retry loop logs it.
                self.open_probed_handle(config)
                    .await
                    .map_err(|e| e.map_messages(|m| config.redact(m)))
            }
        })
        .await?;

        tracing::info!(handle_id = %handle.id(), descriptor = %descriptor, "connection handle ready");
        *slot = Some(handle.clone());
        Ok(handle)
    }

    async fn open_probed_handle(&self, config: &ConnectionConfig) -> Result<ConnectionHandle> {
        let handle = ConnectionHandle::open(Arc::clone(&self.driver), config, self.pool_config.clone());

        let probe = async {
            let conn = handle.acquire().await?;
            let latency = ping_database(&*conn, self.driver.liveness_probe()).await?;
            tracing::debug!(latency_ms = latency.as_millis() as u64, "liveness probe succeeded");
            Ok::<_, JobscopeError>(())
        }
        .await;

        match probe {
            Ok(()) => Ok(handle),
            Err(e) => {
                handle.close().await;
                Err(e)
            }
        }
    }

    /// Dispose of the cached handle after a mid-use connection failure.
    ///
    /// The next `get_handle` opens and probes a fresh one.
    pub async fn invalidate(&self) {
        let mut slot = self.handle.lock().await;
        if let Some(handle) = slot.take() {
            tracing::warn!(handle_id = %handle.id(), "invalidating connection handle");
            handle.close().await;
        }
    }

    pub async fn state(&self) -> HandleState {
        match self.handle.lock().await.as_ref() {
            Some(_) => HandleState::Open,
            None => HandleState::Unopened,
        }
    }

    pub async fn is_open(&self) -> bool {
        self.state().await == HandleState::Open
    }

    /// Run a `;`-separated script file in a single transaction.
    #[tracing::instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub async fn execute_script(&self, path: impl AsRef<Path>) -> Result<ScriptReport> {
        let path = path.as_ref();
        let script = tokio::fs::read_to_string(path).await.map_err(|e| {
            JobscopeError::Io(std::io::Error::new(
                e.kind(),
                format!("cannot read script {}: {}", path.display(), e),
            ))
        })?;
        self.execute_sql(&script).await
    }

    /// Run already loaded script text in a single transaction
    pub async fn execute_sql(&self, script: &str) -> Result<ScriptReport> {
        let handle = self.handle().await?;
        run_script(&handle, script)
            .await
            .map_err(|e| e.map_messages(|m| self.redact(m)))
    }

    /// Run the schema script: `schema_path`, or the manager's default.
    pub async fn create_schema(&self, schema_path: Option<&Path>) -> Result<ScriptReport> {
        let path = schema_path.unwrap_or(&self.schema_path);
        tracing::info!(path = %path.display(), "creating schema");
        self.execute_script(path).await
    }

    /// Check connectivity and describe the store. Never fails; problems are
    /// reported in the returned status.
    #[tracing::instrument(skip(self), fields(database = %self.config.database()))]
    pub async fn test_connection(&self) -> ConnectionStatus {
        let status = match self.collect_status().await {
            Ok(status) => status,
            Err(e) => ConnectionStatus::failed(self.current_config(), &e.to_string()),
        };

        match &status.error {
            None => tracing::info!(
                server_version = status.server_version.as_deref().unwrap_or_default(),
                table_count = status.table_count.unwrap_or_default(),
                "connection test succeeded"
            ),
            Some(error) => tracing::warn!(error = %error, "connection test failed"),
        }
        status
    }

    async fn collect_status(&self) -> Result<ConnectionStatus> {
        let handle = self.handle().await?;
        let conn = handle.acquire().await?;

        let start = Instant::now();
        let version = conn.query(self.driver.server_version_query(), &[]).await?;
        let latency = start.elapsed();
        let server_version = version.scalar().map(Value::to_string).unwrap_or_default();

        let count = conn.query(self.driver.table_count_query(), &[]).await?;
        let table_count = count.scalar().and_then(Value::as_i64).unwrap_or_default();

        Ok(ConnectionStatus::connected(
            self.current_config(),
            server_version,
            table_count,
            latency,
        ))
    }

    /// Every column of every user table, ordered by table then position.
    ///
    /// Returns an empty list when the information cannot be read.
    #[tracing::instrument(skip(self))]
    pub async fn get_table_info(&self) -> Vec<TableColumnInfo> {
        match self.fetch_table_info().await {
            Ok(columns) => columns,
            Err(e) => {
                tracing::warn!(error = %self.redact(&e.to_string()), "could not read table information");
                Vec::new()
            }
        }
    }

    async fn fetch_table_info(&self) -> Result<Vec<TableColumnInfo>> {
        let handle = self.handle().await?;
        let result = handle.query(self.driver.table_info_query(), &[]).await?;

        let columns: Vec<TableColumnInfo> = result
            .rows
            .iter()
            .filter_map(TableColumnInfo::from_row)
            .collect();
        let skipped = result.rows.len() - columns.len();
        if skipped > 0 {
            tracing::warn!(skipped, "ignored malformed table information rows");
        }
        tracing::debug!(columns = columns.len(), "table information read");
        Ok(columns)
    }

    /// Dispose of the handle if one is open. Safe to call repeatedly; a later
    /// `get_handle` reopens lazily.
    #[tracing::instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        let mut slot = self.handle.lock().await;
        match slot.take() {
            Some(handle) => {
                handle.close().await;
                tracing::info!(handle_id = %handle.id(), "connection handle disposed");
            }
            None => tracing::debug!("no open connection handle"),
        }
        Ok(())
    }
}
