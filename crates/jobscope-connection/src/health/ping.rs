//! Liveness probe

use std::time::{Duration, Instant};

use jobscope_core::{Connection, JobscopeError};

/// Result of a ping operation
pub type PingResult = Result<Duration, PingError>;

/// Error that can occur during a ping operation
#[derive(Debug, Clone, thiserror::Error)]
pub enum PingError {
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("Ping query failed: {0}")]
    QueryFailed(String),
}

impl From<PingError> for JobscopeError {
    /// A failed probe means the session is unusable, so it counts as a
    /// (retryable) connection failure.
    fn from(error: PingError) -> Self {
        JobscopeError::connection(format!("liveness probe failed: {}", error))
    }
}

/// Run the probe query on a session and return the round-trip time.
pub async fn ping_database(conn: &dyn Connection, probe: &str) -> PingResult {
    if conn.is_closed() {
        return Err(PingError::ConnectionClosed);
    }

    let start = Instant::now();
    match conn.query(probe, &[]).await {
        Ok(_) => Ok(start.elapsed()),
        Err(e) => Err(PingError::QueryFailed(e.to_string())),
    }
}
