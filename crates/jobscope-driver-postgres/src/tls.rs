//! PostgreSQL TLS Support
//!
//! Builds the native-tls connector handed to tokio-postgres for the
//! `prefer` and `require` ssl modes.

use jobscope_core::SslMode;
use native_tls::TlsConnector as NativeTlsConnector;
use postgres_native_tls::MakeTlsConnector;

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// The platform TLS backend rejected the configuration
    #[error("Failed to build TLS connector: {0}")]
    BuildFailed(#[from] native_tls::Error),
}

/// Build a TLS connector for the given mode.
///
/// Returns `None` for [`SslMode::Disable`]. The other modes mirror libpq
/// without a root certificate: the channel is encrypted but the server
/// certificate and hostname are not verified.
pub fn build_tls_connector(mode: SslMode) -> Result<Option<MakeTlsConnector>, TlsError> {
    if mode == SslMode::Disable {
        return Ok(None);
    }

    tracing::debug!(ssl_mode = %mode, "building PostgreSQL TLS connector");

    let connector = NativeTlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;

    Ok(Some(MakeTlsConnector::new(connector)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disable_has_no_connector() {
        assert!(build_tls_connector(SslMode::Disable).unwrap().is_none());
    }
}
