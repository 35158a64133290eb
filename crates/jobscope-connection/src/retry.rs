//! Retry policy for opening connections
//!
//! Transient failures (unreachable store, refused or dropped sessions) are
//! retried with a fixed or exponentially growing delay. Anything else fails on
//! the first attempt.
//!
//! # Example
//!
//! ```ignore
//! use jobscope_connection::retry::{RetryPolicy, retry_with_policy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new(3, Duration::from_secs(2));
//! let handle = retry_with_policy(&policy, |attempt| open_handle(attempt)).await?;
//! ```

mod policy;


pub use policy::{RetryPolicy, retry_with_policy};
