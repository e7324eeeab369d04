//! # Error Handling
//!
//! Centralized error types for Ferrule core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! The variants fall into four families:
//!
//! - builder misuse ([`Error::Sequencing`]) - a programming defect
//! - record misuse ([`Error::Precondition`], [`Error::Conversion`])
//! - infrastructure ([`Error::Database`], [`Error::DefaultControllerMissing`], IO)
//! - routing misses ([`Error::RouteNotFound`], [`Error::Coercion`]) - answered with 404

use thiserror::Error;

/// Result type alias for Ferrule operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the Ferrule runtime
#[derive(Error, Debug)]
pub enum Error {
    /// Server failed to bind to the specified address
    #[error("Failed to bind server to {address}: {source}")]
    BindError {
        /// The address we tried to bind to
        address: String,
        /// The underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// No controller/action/argument combination matched the path
    #[error("No route found for path: {path}")]
    RouteNotFound {
        /// The path that wasn't matched
        path: String,
    },

    /// A path segment could not be coerced to the declared parameter kind
    #[error("Cannot convert '{value}' to {expected}")]
    Coercion {
        /// Raw segment
        value: String,
        /// Declared parameter kind
        expected: &'static str,
    },

    /// The configured default controller is not registered
    #[error("Default controller '{name}' is not registered")]
    DefaultControllerMissing {
        /// Configured controller name
        name: String,
    },

    /// Query builder method called out of order, twice, or not allowed
    #[error("Query builder misuse at {clause}: {reason}")]
    Sequencing {
        /// Clause being called (or checked at render time)
        clause: &'static str,
        /// What went wrong
        reason: String,
    },

    /// Record operation attempted without its preconditions
    #[error("Precondition failed: {message}")]
    Precondition {
        /// What was violated
        message: String,
    },

    /// A stored value does not fit the record field it maps onto
    #[error("Cannot map column '{column}': expected {expected}, found {found}")]
    Conversion {
        /// Column name
        column: String,
        /// Expected field kind
        expected: &'static str,
        /// Description of the stored value
        found: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be read or parsed
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Database error
    #[error("Database error: {message}")]
    Database {
        /// Error message from database
        message: String,
    },
}

impl Error {
    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    pub(crate) fn sequencing(clause: &'static str, reason: impl Into<String>) -> Self {
        Self::Sequencing {
            clause,
            reason: reason.into(),
        }
    }

    /// Whether this error is a normal routing outcome rather than a failure
    #[must_use]
    pub const fn is_routing_miss(&self) -> bool {
        matches!(self, Self::RouteNotFound { .. } | Self::Coercion { .. })
    }

    /// HTTP status the request handler answers with for this error
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        if self.is_routing_miss() {
            404
        } else {
            500
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_not_found_error() {
        let err = Error::RouteNotFound {
            path: "/unknown".to_string(),
        };
        assert!(err.to_string().contains("/unknown"));
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_bind_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let err = Error::BindError {
            address: "0.0.0.0:8000".to_string(),
            source: io_err,
        };
        assert!(err.to_string().contains("0.0.0.0:8000"));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_coercion_is_a_routing_miss() {
        let err = Error::Coercion {
            value: "abc".to_string(),
            expected: "int",
        };
        assert!(err.is_routing_miss());
        assert_eq!(err.to_string(), "Cannot convert 'abc' to int");
    }

    #[test]
    fn test_infrastructure_errors_are_internal() {
        let err = Error::DefaultControllerMissing {
            name: "Site".to_string(),
        };
        assert_eq!(err.status_code(), 500);

        let err = Error::sequencing("from", "was already called");
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("from"));
    }
}
