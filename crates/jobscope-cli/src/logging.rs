//! Logging and tracing setup for the `jobscope` binary
//!
//! Console output always goes to stderr so that stdout stays machine
//! readable (`status --json`, `tables --json`). `RUST_LOG` overrides the
//! default filter. With `--log-file`, JSON records are also appended to
//! that file through a non-blocking writer.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::LogFormat;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Format of the stderr output
    pub format: LogFormat,

    /// Optional JSON log file
    pub log_file: Option<PathBuf>,

    /// Whether to include file/line information in console logs
    pub include_location: bool,

    /// Whether to log span open/close (for timing manager operations)
    pub enable_spans: bool,

    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            log_file: None,
            include_location: cfg!(debug_assertions),
            enable_spans: false,
            default_filter: "warn,jobscope=info,jobscope_connection=info,jobscope_driver_postgres=info,jobscope_core=info".to_string(),
        }
    }
}

/// Initialize the global subscriber.
///
/// The returned guard flushes the log file when dropped and must be held
/// until the program exits.
pub fn init(config: LoggingConfig) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    // NEW fires once when the span is created; ENTER would fire on every async
    // re-poll.
    let span_events = if config.enable_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let mut layers = Vec::new();

    let console_layer = match config.format {
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_span_events(span_events.clone())
            .with_ansi(std::io::IsTerminal::is_terminal(&std::io::stderr()))
            .compact()
            .with_filter(env_filter.clone())
            .boxed(),
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_span_events(span_events.clone())
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_filter(env_filter.clone())
            .boxed(),
    };
    layers.push(console_layer);

    let mut guard = None;
    if let Some(path) = &config.log_file {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("log file path has no file name: {}", path.display()))?;
        std::fs::create_dir_all(&dir)?;

        let file_appender = tracing_appender::rolling::never(&dir, file_name);
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(worker_guard);

        let json_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(span_events)
            .with_ansi(false)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(non_blocking)
            .with_filter(env_filter)
            .boxed();
        layers.push(json_layer);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        format = ?config.format,
        log_file = ?config.log_file,
        "logging initialized"
    );
    Ok(guard)
}
