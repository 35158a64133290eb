//! Health classification and the status snapshot returned by `test_connection`

use std::time::Duration;

use chrono::{DateTime, Utc};
use jobscope_core::ConnectionConfig;
use serde::{Deserialize, Serialize};

/// How responsive a reachable store was, judged from the probe round trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Judge `latency` against [`HealthThresholds::default`]
    pub fn from_latency(latency: Duration) -> Self {
        HealthThresholds::default().classify(latency)
    }

    /// A degraded store still answers; only `Unhealthy` is unusable.
    pub fn is_usable(self) -> bool {
        self != HealthStatus::Unhealthy
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Latency limits, inclusive: up to `healthy` is healthy, up to `degraded`
/// is degraded, anything slower is unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthThresholds {
    healthy: Duration,
    degraded: Duration,
}

impl HealthThresholds {
    /// `degraded` is raised to `healthy` when given smaller.
    pub fn new(healthy: Duration, degraded: Duration) -> Self {
        Self {
            healthy,
            degraded: degraded.max(healthy),
        }
    }

    pub fn healthy(&self) -> Duration {
        self.healthy
    }

    pub fn degraded(&self) -> Duration {
        self.degraded
    }

    pub fn classify(&self, latency: Duration) -> HealthStatus {
        match latency {
            l if l <= self.healthy => HealthStatus::Healthy,
            l if l <= self.degraded => HealthStatus::Degraded,
            _ => HealthStatus::Unhealthy,
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_millis(500))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionOutcome {
    Connected,
    Failed,
}

/// Snapshot produced by a diagnostic connection check.
///
/// `descriptor` is always the masked form, and `error` has been redacted, so
/// the whole value is safe to print or serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub outcome: ConnectionOutcome,
    pub database: String,
    pub descriptor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl ConnectionStatus {
    pub fn connected(
        config: &ConnectionConfig,
        server_version: String,
        table_count: i64,
        latency: Duration,
    ) -> Self {
        Self {
            outcome: ConnectionOutcome::Connected,
            database: config.database().to_string(),
            descriptor: config.masked_descriptor(),
            server_version: Some(server_version),
            table_count: Some(table_count),
            latency_ms: Some(latency.as_millis() as u64),
            health: Some(HealthStatus::from_latency(latency)),
            error: None,
            checked_at: Utc::now(),
        }
    }

    /// A failed check; `error` is redacted against the config's password
    pub fn failed(config: &ConnectionConfig, error: &str) -> Self {
        let mut message = config.redact(error);
        if message.trim().is_empty() {
            message = "unknown error".to_string();
        }
        Self {
            outcome: ConnectionOutcome::Failed,
            database: config.database().to_string(),
            descriptor: config.masked_descriptor(),
            server_version: None,
            table_count: None,
            latency_ms: None,
            health: None,
            error: Some(message),
            checked_at: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.outcome == ConnectionOutcome::Connected
    }
}
