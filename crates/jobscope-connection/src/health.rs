//! Liveness probing and connection status reporting
//!
//! # Example
//!
//! ```ignore
//! use jobscope_connection::health::{ping_database, HealthStatus};
//!
//! let latency = ping_database(&*session, "SELECT 1").await?;
//! let status = HealthStatus::from_latency(latency);
//! ```

mod ping;
mod status;

#[cfg(test)]
mod tests;

pub use ping::{PingError, PingResult, ping_database};
pub use status::{ConnectionOutcome, ConnectionStatus, HealthStatus, HealthThresholds};
