//! Credential resolvers
//!
//! The manager never reads passwords from the environment or a terminal on
//! its own. It asks the resolver it was built with, once, right before the
//! first connection that needs a password.
//!
//! Keychain entries live under the service `dev.jobscope.database` with one
//! account per target (`user@host:port/database`):
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: kernel keyutils

use async_trait::async_trait;
use jobscope_core::{ConnectionConfig, JobscopeError, Result};
use std::sync::Arc;

/// Environment variable read by [`EnvPassword::default`]
pub const DEFAULT_PASSWORD_ENV: &str = "JOBSCOPE_DB_PASSWORD";

/// Service name used for keychain entries
pub const KEYRING_SERVICE: &str = "dev.jobscope.database";

/// Supplies a password for a configuration that does not carry one.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Return the password, `None` when this resolver has none to offer
    async fn resolve(&self, config: &ConnectionConfig) -> Result<Option<String>>;
}

#[async_trait]
impl<T: CredentialResolver + ?Sized> CredentialResolver for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn resolve(&self, config: &ConnectionConfig) -> Result<Option<String>> {
        (**self).resolve(config).await
    }
}

/// Never supplies a password; for stores using trust or peer authentication
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCredentials;

#[async_trait]
impl CredentialResolver for NoCredentials {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn resolve(&self, _config: &ConnectionConfig) -> Result<Option<String>> {
        Ok(None)
    }
}

/// A fixed password
#[derive(Clone)]
pub struct StaticPassword(String);

impl StaticPassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }
}

impl std::fmt::Debug for StaticPassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticPassword(***)")
    }
}

#[async_trait]
impl CredentialResolver for StaticPassword {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn resolve(&self, _config: &ConnectionConfig) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// Reads the password from one named environment variable.
///
/// An unset or empty variable yields `None`.
#[derive(Debug, Clone)]
pub struct EnvPassword {
    variable: String,
}

impl EnvPassword {
    pub fn new(variable: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
        }
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
}

impl Default for EnvPassword {
    fn default() -> Self {
        Self::new(DEFAULT_PASSWORD_ENV)
    }
}

#[async_trait]
impl CredentialResolver for EnvPassword {
    fn name(&self) -> &'static str {
        "env"
    }

    async fn resolve(&self, _config: &ConnectionConfig) -> Result<Option<String>> {
        match std::env::var(&self.variable) {
            Ok(value) if !value.is_empty() => Ok(Some(value)),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
            Err(std::env::VarError::NotUnicode(_)) => Err(JobscopeError::Credential(format!(
                "{} is not valid UTF-8",
                self.variable
            ))),
        }
    }
}

/// Passwords stored in the system keychain
#[derive(Debug, Clone)]
pub struct KeyringPassword {
    service: String,
}

impl KeyringPassword {
    pub fn new() -> Self {
        Self::with_service(KEYRING_SERVICE)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Keychain account for a target: `user@host:port/database`
    pub fn account(config: &ConnectionConfig) -> String {
        format!(
            "{}@{}:{}/{}",
            config.username(),
            config.host(),
            config.port(),
            config.database()
        )
    }

    fn entry(&self, config: &ConnectionConfig) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &Self::account(config)).map_err(|e| {
            JobscopeError::Credential(format!("Failed to create keyring entry: {}", e))
        })
    }

    /// Save a password for the target, replacing any previous one
    pub fn store(&self, config: &ConnectionConfig, password: &str) -> Result<()> {
        self.entry(config)?.set_password(password).map_err(|e| {
            JobscopeError::Credential(format!("Failed to store password in keychain: {}", e))
        })?;
        tracing::debug!(account = %Self::account(config), "stored password in keychain");
        Ok(())
    }

    /// Remove the target's password. Returns `false` when there was none.
    pub fn delete(&self, config: &ConnectionConfig) -> Result<bool> {
        match self.entry(config)?.delete_credential() {
            Ok(()) => {
                tracing::debug!(account = %Self::account(config), "deleted password from keychain");
                Ok(true)
            }
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(JobscopeError::Credential(format!(
                "Failed to delete keychain entry: {}",
                e
            ))),
        }
    }

    fn lookup(&self, config: &ConnectionConfig) -> Result<Option<String>> {
        match self.entry(config)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => {
                tracing::debug!(account = %Self::account(config), "no password in keychain");
                Ok(None)
            }
            Err(e) => Err(JobscopeError::Credential(format!(
                "Failed to access keychain: {}",
                e
            ))),
        }
    }
}

impl Default for KeyringPassword {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialResolver for KeyringPassword {
    fn name(&self) -> &'static str {
        "keyring"
    }

    async fn resolve(&self, config: &ConnectionConfig) -> Result<Option<String>> {
        // Keychain backends block, sometimes on a user prompt.
        let resolver = self.clone();
        let config = config.clone();
        tokio::task::spawn_blocking(move || resolver.lookup(&config))
            .await
            .map_err(|e| JobscopeError::Credential(format!("keychain lookup panicked: {}", e)))?
    }
}

/// Tries resolvers in order; the first `Some` wins.
///
/// A failing resolver is logged and skipped so that, for example, a locked
/// keychain still lets the terminal prompt run.
#[derive(Default)]
pub struct ChainedResolver {
    resolvers: Vec<Box<dyn CredentialResolver>>,
}

impl ChainedResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl CredentialResolver + 'static) -> Self {
        self.resolvers.push(Box::new(resolver));
        self
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }
}

#[async_trait]
impl CredentialResolver for ChainedResolver {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn resolve(&self, config: &ConnectionConfig) -> Result<Option<String>> {
        let mut last_error = None;
        for resolver in &self.resolvers {
            match resolver.resolve(config).await {
                Ok(Some(password)) => {
                    tracing::debug!(resolver = resolver.name(), "password resolved");
                    return Ok(Some(password));
                }
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(resolver = resolver.name(), error = %e, "credential resolver failed");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }
}
