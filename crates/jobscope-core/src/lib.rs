//! Jobscope Core - Core abstractions for the job-market database layer
//!
//! This crate provides the types and traits the rest of the workspace
//! depends on:
//!
//! - `ConnectionConfig` - Connection parameters and descriptor rendering
//! - `DatabaseDriver` - Trait for driver implementations
//! - `Connection` / `Transaction` - Traits for live sessions
//! - `JobscopeError` - The shared error taxonomy
//! - Common types like `Value`, `Row`, `QueryResult`, `TableColumnInfo`

mod config;
mod connection;
mod driver;
mod error;
mod schema;
mod types;

pub use config::*;
pub use connection::*;
pub use driver::*;
pub use error::*;
pub use schema::*;
pub use types::*;
