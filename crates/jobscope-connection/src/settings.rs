//! Optional TOML settings file
//!
//! ```toml
//! [database]
//! host = "localhost"
//! port = 5432
//! username = "postgres"
//! database = "job_market"
//! ssl_mode = "prefer"
//! password_env = "JOBSCOPE_DB_PASSWORD"
//!
//! [pool]
//! max_size = 5
//! max_overflow = 10
//!
//! [retry]
//! attempts = 3
//! delay_ms = 2000
//!
//! [schema]
//! path = "sql/schema.sql"
//! ```
//!
//! Every section and key is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use jobscope_core::{ConnectionConfig, DEFAULT_PORT, JobscopeError, Result, SslMode};
use serde::{Deserialize, Serialize};

use crate::credentials::DEFAULT_PASSWORD_ENV;
use crate::pool::PoolConfig;
use crate::retry::RetryPolicy;

/// Environment variable naming an explicit settings file
pub const CONFIG_ENV: &str = "JOBSCOPE_CONFIG";

/// Default schema script, relative to the working directory
pub const DEFAULT_SCHEMA_PATH: &str = "sql/schema.sql";

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_USERNAME: &str = "postgres";
pub const DEFAULT_DATABASE: &str = "job_market";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub pool: PoolSettings,
    pub retry: RetrySettings,
    pub schema: SchemaSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    /// Accepted, but prefer `password_env` or the keychain
    pub password: Option<String>,
    pub database: Option<String>,
    pub ssl_mode: Option<SslMode>,
    pub password_env: Option<String>,
    pub application_name: Option<String>,
    pub connect_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolSettings {
    pub max_size: Option<usize>,
    pub max_overflow: Option<usize>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub max_lifetime_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub attempts: Option<u32>,
    pub delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub max_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemaSettings {
    pub path: Option<PathBuf>,
}

impl Settings {
    /// Parse settings from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| JobscopeError::Configuration(format!("invalid settings file: {}", e)))
    }

    /// Read and parse a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            JobscopeError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        let settings = Self::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded settings file");
        Ok(settings)
    }

    /// Locate and load the settings file.
    ///
    /// An explicit path (flag or `JOBSCOPE_CONFIG`) must exist. Otherwise
    /// `<config dir>/jobscope/jobscope.toml` is used when present, and
    /// defaults when it is not.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|p| !p.is_empty()) {
            return Self::load(Path::new(&path));
        }
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// `<config dir>/jobscope/jobscope.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jobscope").join("jobscope.toml"))
    }

    /// Connection parameters with defaults for anything unset
    pub fn connection_config(&self) -> ConnectionConfig {
        let db = &self.database;
        let mut config = ConnectionConfig::new(
            db.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
            db.username.clone().unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            db.database.clone().unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
        )
        .with_port(db.port.unwrap_or(DEFAULT_PORT));

        if let Some(password) = &db.password {
            config = config.with_password(password.clone());
        }
        if let Some(ssl_mode) = db.ssl_mode {
            config = config.with_ssl_mode(ssl_mode);
        }
        if let Some(name) = &db.application_name {
            config = config.with_application_name(name.clone());
        }
        if let Some(secs) = db.connect_timeout_secs {
            config = config.with_connect_timeout_secs(secs);
        }
        config
    }

    /// Variable the environment resolver should read
    pub fn password_env(&self) -> &str {
        self.database
            .password_env
            .as_deref()
            .unwrap_or(DEFAULT_PASSWORD_ENV)
    }

    pub fn pool_config(&self) -> Result<PoolConfig> {
        let defaults = PoolConfig::default();
        let pool = &self.pool;

        let max_size = pool.max_size.unwrap_or(defaults.max_size());
        if max_size == 0 {
            return Err(JobscopeError::Configuration(
                "pool.max_size must be greater than 0".into(),
            ));
        }

        let mut config = PoolConfig::new(max_size, pool.max_overflow.unwrap_or(defaults.max_overflow()));
        if let Some(ms) = pool.acquire_timeout_ms {
            config = config.with_acquire_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = pool.idle_timeout_ms {
            config = config.with_idle_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = pool.max_lifetime_ms {
            config = config.with_max_lifetime(Duration::from_millis(ms));
        }
        Ok(config)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        let retry = &self.retry;
        let delay = retry
            .delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_delay());
        let policy = RetryPolicy::new(retry.attempts.unwrap_or(defaults.attempts()), delay);

        match retry.backoff_multiplier {
            Some(multiplier) => {
                let cap = retry
                    .max_delay_ms
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_secs(30));
                policy.with_backoff(multiplier, cap)
            }
            None => policy,
        }
    }

    pub fn schema_path(&self) -> PathBuf {
        self.schema
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH))
    }
}
