//! Connection configuration and descriptor rendering

use crate::{JobscopeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default PostgreSQL port
pub const DEFAULT_PORT: u16 = 5432;

/// Database every PostgreSQL server carries; used to create other databases
pub const ADMIN_DATABASE: &str = "postgres";

/// Placeholder substituted for the password whenever a descriptor is shown
pub const PASSWORD_MASK: &str = "***";

/// Scheme used in rendered connection descriptors
pub const DESCRIPTOR_SCHEME: &str = "postgresql";

/// TLS negotiation mode for the client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// Plain TCP only
    Disable,
    /// Try TLS first, fall back to plain TCP
    #[default]
    Prefer,
    /// TLS required
    Require,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = JobscopeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" | "allow" => Ok(SslMode::Prefer),
            "require" | "verify-ca" | "verify-full" => Ok(SslMode::Require),
            other => Err(JobscopeError::Configuration(format!(
                "unknown ssl mode: {}",
                other
            ))),
        }
    }
}

/// Parameters needed to reach the relational store.
///
/// Built once through the `with_*` methods and then treated as read-only.
/// The password is optional: when it is missing the connection manager asks
/// its credential resolver before the first real connection.
///
/// `Debug` and `Display` render the masked descriptor, so a config can be
/// logged without leaking the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    host: String,
    port: u16,
    username: String,
    password: Option<String>,
    database: String,
    ssl_mode: SslMode,
    application_name: String,
    connect_timeout_secs: u64,
}

impl ConnectionConfig {
    /// Create a configuration on the default port with no password
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: None,
            database: database.into(),
            ssl_mode: SslMode::default(),
            application_name: "jobscope".to_string(),
            connect_timeout_secs: 10,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_ssl_mode(mut self, ssl_mode: SslMode) -> Self {
        self.ssl_mode = ssl_mode;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    /// Same parameters, different target database
    pub fn for_database(&self, database: impl Into<String>) -> Self {
        let mut config = self.clone();
        config.database = database.into();
        config
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn has_password(&self) -> bool {
        self.password.is_some()
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn ssl_mode(&self) -> SslMode {
        self.ssl_mode
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn connect_timeout_secs(&self) -> u64 {
        self.connect_timeout_secs
    }

    /// Check that host, port, username and database are usable
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(JobscopeError::Configuration("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(JobscopeError::Configuration("port must be greater than 0".into()));
        }
        if self.username.trim().is_empty() {
            return Err(JobscopeError::Configuration(
                "username must not be empty".into(),
            ));
        }
        if self.database.trim().is_empty() {
            return Err(JobscopeError::Configuration(
                "database name must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Connection descriptor with the password replaced by `***`
    pub fn masked_descriptor(&self) -> String {
        let mut descriptor = format!("{}://{}", DESCRIPTOR_SCHEME, self.username);
        if self.password.is_some() {
            descriptor.push(':');
            descriptor.push_str(PASSWORD_MASK);
        }
        descriptor.push_str(&format!("@{}:{}/{}", self.host, self.port, self.database));
        descriptor
    }

    /// Replace every occurrence of the password in `text` with `***`.
    ///
    /// Driver error messages can echo connection strings back, so anything
    /// derived from them passes through here before being logged or shown.
    pub fn redact(&self, text: &str) -> String {
        match self.password.as_deref() {
            Some(p) if !p.is_empty() => text.replace(p, PASSWORD_MASK),
            _ => text.to_string(),
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("descriptor", &self.masked_descriptor())
            .field("ssl_mode", &self.ssl_mode)
            .field("application_name", &self.application_name)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked_descriptor())
    }
}
