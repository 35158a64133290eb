use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_MAX_SIZE: usize = 5;
const DEFAULT_MAX_OVERFLOW: usize = 10;
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Sizing and session lifecycle of a [`ConnectionPool`](super::ConnectionPool).
///
/// At most `max_size` sessions stay open between uses. Under load up to
/// `max_overflow` more may be opened; those are closed as soon as they are
/// released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    max_size: usize,
    max_overflow: usize,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    max_lifetime: Option<Duration>,
}

impl PoolConfig {
    /// A `max_size` of zero is raised to one; a pool always keeps a session.
    pub fn new(max_size: usize, max_overflow: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            max_overflow,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            max_lifetime: None,
        }
    }

    /// How long `get` waits for a free slot before giving up
    pub fn with_acquire_timeout(self, acquire_timeout: Duration) -> Self {
        Self {
            acquire_timeout,
            ..self
        }
    }

    /// Idle sessions unused for longer than this are closed instead of reused
    pub fn with_idle_timeout(self, idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            ..self
        }
    }

    /// Sessions older than this are closed instead of reused
    pub fn with_max_lifetime(self, max_lifetime: Duration) -> Self {
        Self {
            max_lifetime: Some(max_lifetime),
            ..self
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_overflow(&self) -> usize {
        self.max_overflow
    }

    /// Sessions that may be checked out at once
    pub fn capacity(&self) -> usize {
        self.max_size + self.max_overflow
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_MAX_OVERFLOW)
    }
}
