//! `jobscope` - set up and inspect the job-market database

mod commands;
mod logging;
mod output;
mod prompt;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use jobscope_connection::Settings;
use jobscope_core::SslMode;

#[derive(Debug, Parser)]
#[command(name = "jobscope", version, about = "Set up and inspect the Jobscope database")]
struct Cli {
    #[command(flatten)]
    target: TargetArgs,

    /// Settings file (defaults to $JOBSCOPE_CONFIG, then the user config dir)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Never ask for a password on the terminal
    #[arg(long, global = true)]
    no_prompt: bool,

    /// Log output format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Also write JSON logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Connection flags; each overrides the settings file
#[derive(Debug, Default, Args)]
struct TargetArgs {
    #[arg(long, global = true, env = "JOBSCOPE_DB_HOST")]
    host: Option<String>,

    #[arg(long, global = true, env = "JOBSCOPE_DB_PORT")]
    port: Option<u16>,

    #[arg(long, global = true, env = "JOBSCOPE_DB_USER")]
    user: Option<String>,

    #[arg(long, global = true, env = "JOBSCOPE_DB_NAME")]
    database: Option<String>,

    /// disable, prefer or require
    #[arg(long, global = true)]
    ssl_mode: Option<SslMode>,
}

impl TargetArgs {
    fn apply(&self, settings: &mut Settings) {
        let db = &mut settings.database;
        if let Some(host) = &self.host {
            db.host = Some(host.clone());
        }
        if let Some(port) = self.port {
            db.port = Some(port);
        }
        if let Some(user) = &self.user {
            db.username = Some(user.clone());
        }
        if let Some(database) = &self.database {
            db.database = Some(database.clone());
        }
        if let Some(ssl_mode) = self.ssl_mode {
            db.ssl_mode = Some(ssl_mode);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the target database (succeeds if it already exists)
    CreateDatabase,

    /// Run the schema script against the target database
    CreateSchema {
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Create the database, then the schema
    Setup {
        #[arg(long, value_name = "PATH")]
        path: Option<PathBuf>,
    },

    /// Run a `;`-separated SQL script in one transaction
    Exec { file: PathBuf },

    /// Check connectivity; exits with 1 when the store is unreachable
    Status {
        #[arg(long)]
        json: bool,
    },

    /// List the columns of every user table
    Tables {
        #[arg(long)]
        json: bool,
    },

    /// Manage the password kept in the OS keychain
    Password {
        #[command(subcommand)]
        action: PasswordAction,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
enum PasswordAction {
    /// Prompt for the password and store it
    Set,
    /// Remove the stored password
    Clear,
}

impl Cli {
    fn logging_config(&self) -> logging::LoggingConfig {
        logging::LoggingConfig {
            format: self.log_format,
            log_file: self.log_file.clone(),
            ..logging::LoggingConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match logging::init(cli.logging_config()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("jobscope: failed to initialise logging: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    match commands::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
