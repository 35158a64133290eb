//! Subcommand implementations

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use jobscope_connection::{
    ChainedResolver, ConnectionManager, DatabaseCreation, EnvPassword, KeyringPassword,
    ScriptReport, Settings,
};
use jobscope_driver_postgres::PostgresDriver;

use crate::prompt::{PromptPassword, prompt_new_password};
use crate::{Cli, Command, PasswordAction, output};

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut settings =
        Settings::discover(cli.config.as_deref()).context("failed to load settings")?;
    cli.target.apply(&mut settings);

    // Nothing connects until a command needs the store.
    let manager = build_manager(&settings, cli.no_prompt)?;
    tracing::debug!(target_db = %manager.masked_descriptor(), "manager ready");

    let result = dispatch(&manager, &settings, cli.command).await;
    if let Err(e) = manager.close().await {
        tracing::warn!(error = %e, "failed to close connection handle");
    }
    result
}

fn build_manager(settings: &Settings, no_prompt: bool) -> anyhow::Result<ConnectionManager> {
    let mut resolver = ChainedResolver::new()
        .with(EnvPassword::new(settings.password_env()))
        .with(KeyringPassword::new());
    if !no_prompt {
        resolver = resolver.with(PromptPassword);
    }

    let manager = ConnectionManager::from_settings(settings, Arc::new(PostgresDriver::new()))
        .context("invalid settings")?
        .with_credentials(resolver);
    Ok(manager)
}

async fn dispatch(
    manager: &ConnectionManager,
    settings: &Settings,
    command: Command,
) -> anyhow::Result<ExitCode> {
    match command {
        Command::CreateDatabase => {
            create_database(manager).await?;
        }
        Command::CreateSchema { path } => {
            create_schema(manager, path.as_deref()).await?;
        }
        Command::Setup { path } => {
            create_database(manager).await?;
            create_schema(manager, path.as_deref()).await?;
            println!("Setup complete");
        }
        Command::Exec { file } => {
            let report = manager
                .execute_script(&file)
                .await
                .with_context(|| format!("script {} failed", file.display()))?;
            print_report(&report, &file);
        }
        Command::Status { json } => {
            let status = manager.test_connection().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}", output::render_status(&status));
            }
            if !status.is_connected() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Tables { json } => {
            let columns = manager.get_table_info().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&columns)?);
            } else if columns.is_empty() {
                println!("No tables found");
            } else {
                println!("{}", output::render_tables(&columns));
            }
        }
        Command::Password { action } => return password(settings, action).await,
    }
    Ok(ExitCode::SUCCESS)
}

async fn create_database(manager: &ConnectionManager) -> anyhow::Result<()> {
    let database = manager.config().database().to_string();
    match manager
        .create_database()
        .await
        .context("failed to create database")?
    {
        DatabaseCreation::Created => println!("Created database {database}"),
        DatabaseCreation::AlreadyExisted => println!("Database {database} already exists"),
    }
    Ok(())
}

async fn create_schema(manager: &ConnectionManager, path: Option<&Path>) -> anyhow::Result<()> {
    let path = path.unwrap_or(manager.schema_path()).to_path_buf();
    let report = manager
        .create_schema(Some(&path))
        .await
        .context("failed to create schema")?;
    print_report(&report, &path);
    Ok(())
}

fn print_report(report: &ScriptReport, path: &Path) {
    println!(
        "Executed {} statement(s) from {} ({} row(s) affected)",
        report.statements,
        path.display(),
        report.rows_affected
    );
}

async fn password(settings: &Settings, action: PasswordAction) -> anyhow::Result<ExitCode> {
    let config = settings.connection_config();
    config.validate()?;
    let keyring = KeyringPassword::new();
    let account = KeyringPassword::account(&config);

    match action {
        PasswordAction::Set => {
            let password = prompt_new_password(&config).await?;
            tokio::task::spawn_blocking(move || keyring.store(&config, &password))
                .await
                .context("keychain task failed")??;
            println!("Stored password for {account}");
        }
        PasswordAction::Clear => {
            let removed = tokio::task::spawn_blocking(move || keyring.delete(&config))
                .await
                .context("keychain task failed")??;
            if removed {
                println!("Removed password for {account}");
            } else {
                println!("No stored password for {account}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
