//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Point-in-time view of a pool's sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Open sessions (idle + active)
    total: usize,
    /// Sessions waiting in the pool for reuse
    idle: usize,
    /// Sessions currently checked out
    active: usize,
    /// Callers waiting for a session
    waiting: usize,
    /// Maximum sessions in use at once (`max_size + max_overflow`)
    capacity: usize,
}

impl PoolStats {
    pub fn new(idle: usize, active: usize, waiting: usize, capacity: usize) -> Self {
        Self {
            total: idle + active,
            idle,
            active,
            waiting,
            capacity,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn idle(&self) -> usize {
        self.idle
    }

    pub fn active(&self) -> usize {
        self.active
    }

    pub fn waiting(&self) -> usize {
        self.waiting
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Share of the capacity currently checked out, from 0.0 to 1.0
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.active as f64 / self.capacity as f64
        }
    }

    /// Whether the next caller would have to wait
    pub fn is_saturated(&self) -> bool {
        self.capacity > 0 && self.active >= self.capacity
    }
}
