use std::fmt;
use thiserror::Error;

/// Error code and message reported by the database, detached from the driver's types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorError {
    pub code: String,
    pub message: String,
}

impl VendorError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Extract the SQLSTATE and server message, falling back to `fallback_code`
    /// for client-side failures (I/O, TLS, closed connection).
    pub fn from_postgres(err: &tokio_postgres::Error, fallback_code: &str) -> Self {
        match err.as_db_error() {
            Some(db) => Self::new(db.code().code(), db.message()),
            None => Self::new(fallback_code, err.to_string()),
        }
    }

    /// SQLSTATE class 28 is "invalid authorization specification".
    pub fn is_auth_failure(&self) -> bool {
        self.code.starts_with("28")
    }
}

impl fmt::Display for VendorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Completion backend error: {0}")]
    Backend(String),

    #[error("Empty response from completion backend")]
    EmptyResponse,

    #[error("Completion backend did not return a SELECT statement: {0}")]
    UnusableResponse(String),

    #[error("Invalid DSN format: '{0}'. Use 'host:port/service_name'.")]
    MalformedDsn(String),

    #[error("Authentication failed: {0}")]
    Authentication(VendorError),

    #[error("Connection error: {0}")]
    Connection(VendorError),

    #[error("No active connection to the database")]
    NotConnected,

    #[error("Execution error: {0}")]
    Execution(VendorError),

    #[error("Query blocked by security rules: {0}")]
    PolicyRejected(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Local storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, AssistantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_error_renders_code_and_message() {
        let err = AssistantError::Execution(VendorError::new("42P01", "relation \"x\" does not exist"));
        assert_eq!(
            err.to_string(),
            "Execution error: 42P01: relation \"x\" does not exist"
        );
    }

    #[test]
    fn auth_failures_are_class_28() {
        assert!(VendorError::new("28P01", "password authentication failed").is_auth_failure());
        assert!(!VendorError::new("08001", "could not connect").is_auth_failure());
    }
}
