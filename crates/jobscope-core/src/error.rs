//! Error types for Jobscope

use thiserror::Error;

/// SQLSTATE reported by PostgreSQL when `CREATE DATABASE` targets an existing name
pub const SQLSTATE_DUPLICATE_DATABASE: &str = "42P04";

/// Core error type for Jobscope operations
#[derive(Error, Debug)]
pub enum JobscopeError {
    /// Missing or invalid connection parameters; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A credential resolver could not produce a password
    #[error("Credential error: {0}")]
    Credential(String),

    /// The store could not be reached
    #[error("Connection error after {attempts} attempt(s): {message}")]
    Connection { message: String, attempts: u32 },

    /// Failure against the administrative database other than "already exists"
    #[error("Administrative error: {0}")]
    Administrative(String),

    /// A statement of a script failed; the script's transaction was rolled back
    #[error("Script error at statement {index} ({statement}): {message}")]
    Script {
        index: usize,
        statement: String,
        message: String,
    },

    #[error("Query error: {message}")]
    Query {
        message: String,
        sql_state: Option<String>,
    },

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl JobscopeError {
    /// A connection error from a single attempt
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            attempts: 1,
        }
    }

    /// A query error without a SQLSTATE
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
            sql_state: None,
        }
    }

    /// The SQLSTATE attached to a query error, if the server reported one
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Query { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Whether retrying the connection attempt may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::Io(_) | Self::Timeout(_)
        )
    }

    /// Whether the error reports that the target database already exists
    pub fn is_duplicate_database(&self) -> bool {
        self.sql_state() == Some(SQLSTATE_DUPLICATE_DATABASE)
    }

    /// Rewrite every message the error carries, e.g. to scrub a password
    pub fn map_messages(self, f: impl Fn(&str) -> String) -> Self {
        match self {
            Self::Configuration(m) => Self::Configuration(f(&m)),
            Self::Credential(m) => Self::Credential(f(&m)),
            Self::Connection { message, attempts } => Self::Connection {
                message: f(&message),
                attempts,
            },
            Self::Administrative(m) => Self::Administrative(f(&m)),
            Self::Script {
                index,
                statement,
                message,
            } => Self::Script {
                index,
                statement: f(&statement),
                message: f(&message),
            },
            Self::Query { message, sql_state } => Self::Query {
                message: f(&message),
                sql_state,
            },
            Self::Timeout(m) => Self::Timeout(f(&m)),
            Self::Other(m) => Self::Other(f(&m)),
            other @ (Self::Io(_) | Self::Serialization(_)) => other,
        }
    }
}

/// Result type alias for Jobscope operations
pub type Result<T> = std::result::Result<T, JobscopeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_defaults_to_one_attempt() {
        let err = JobscopeError::connection("refused");
        assert!(matches!(err, JobscopeError::Connection { attempts: 1, .. }));
        assert_eq!(err.to_string(), "Connection error after 1 attempt(s): refused");
    }

    #[test]
    fn test_transient_classification() {
        assert!(JobscopeError::connection("x").is_transient());
        assert!(JobscopeError::Timeout("x".into()).is_transient());
        assert!(!JobscopeError::Configuration("x".into()).is_transient());
        assert!(!JobscopeError::Credential("x".into()).is_transient());
        assert!(!JobscopeError::query("x").is_transient());
    }

    #[test]
    fn test_duplicate_database_detection() {
        let err = JobscopeError::Query {
            message: "database \"jobs\" already exists".into(),
            sql_state: Some(SQLSTATE_DUPLICATE_DATABASE.into()),
        };
        assert!(err.is_duplicate_database());
        assert!(!JobscopeError::query("permission denied").is_duplicate_database());
    }

    #[test]
    fn test_script_error_names_statement() {
        let err = JobscopeError::Script {
            index: 2,
            statement: "INSERT INTO b".into(),
            message: "relation \"b\" does not exist".into(),
        };
        let text = err.to_string();
        assert!(text.contains("statement 2"));
        assert!(text.contains("INSERT INTO b"));
    }

    #[test]
    fn test_map_messages_keeps_variant_and_state() {
        let err = JobscopeError::Query {
            message: "failed for secret".into(),
            sql_state: Some("28P01".into()),
        }
        .map_messages(|m| m.replace("secret", "***"));

        assert_eq!(err.sql_state(), Some("28P01"));
        assert_eq!(err.to_string(), "Query error: failed for ***");

        let err = JobscopeError::Connection {
            message: "secret".into(),
            attempts: 3,
        }
        .map_messages(|m| m.replace("secret", "***"));
        assert!(matches!(err, JobscopeError::Connection { attempts: 3, ref message } if message == "***"));
    }
}
