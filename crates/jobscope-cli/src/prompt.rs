//! Terminal password prompt

use std::io::IsTerminal;

use async_trait::async_trait;
use dialoguer::Password;
use jobscope_connection::CredentialResolver;
use jobscope_core::{ConnectionConfig, JobscopeError, Result};

/// Asks for the password on the terminal.
///
/// Yields `None` without prompting when stdin is not a terminal, so piped
/// and scheduled runs fail with the server's authentication error instead
/// of hanging.
pub struct PromptPassword;

#[async_trait]
impl CredentialResolver for PromptPassword {
    fn name(&self) -> &'static str {
        "prompt"
    }

    async fn resolve(&self, config: &ConnectionConfig) -> Result<Option<String>> {
        if !std::io::stdin().is_terminal() {
            tracing::debug!("stdin is not a terminal, skipping password prompt");
            return Ok(None);
        }

        let prompt = format!("Password for {}", config.masked_descriptor());
        let password = tokio::task::spawn_blocking(move || {
            Password::new()
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
        })
        .await
        .map_err(|e| JobscopeError::Credential(format!("password prompt panicked: {}", e)))?
        .map_err(|e| JobscopeError::Credential(format!("password prompt failed: {}", e)))?;

        Ok(Some(password).filter(|p| !p.is_empty()))
    }
}

/// Ask twice for a password to store
pub async fn prompt_new_password(config: &ConnectionConfig) -> Result<String> {
    if !std::io::stdin().is_terminal() {
        return Err(JobscopeError::Credential(
            "a terminal is required to enter the password".into(),
        ));
    }

    let prompt = format!("Password for {}", config.masked_descriptor());
    tokio::task::spawn_blocking(move || {
        Password::new()
            .with_prompt(prompt)
            .with_confirmation("Repeat password", "Error: passwords do not match")
            .interact()
    })
    .await
    .map_err(|e| JobscopeError::Credential(format!("password prompt panicked: {}", e)))?
    .map_err(|e| JobscopeError::Credential(format!("password prompt failed: {}", e)))
}
