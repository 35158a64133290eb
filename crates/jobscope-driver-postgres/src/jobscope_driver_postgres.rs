//! PostgreSQL driver implementation

mod connection;
mod driver;
mod tls;

pub use connection::{PostgresConnection, PostgresTransaction};
pub use driver::{PostgresDriver, quote_identifier};
pub use tls::{TlsError, build_tls_connector};
