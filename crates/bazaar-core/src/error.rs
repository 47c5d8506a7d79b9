//! Error types for the Bazaar gateway

use std::time::Duration;

/// Boxed error carried by [`Error::Upstream`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias using [`Error`]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for the Bazaar gateway
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No registered pattern matched the request path
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// Lookup by id for a service that was never registered
    #[error("Service not registered: {0}")]
    ServiceNotFound(String),

    /// Circuit breaker is open (or its half-open probe slot is taken)
    #[error("Service '{service}' is temporarily unavailable")]
    ServiceUnavailable {
        /// Service id
        service: String,
    },

    /// The wrapped upstream call failed
    #[error("Upstream '{service}' failed: {source}")]
    Upstream {
        /// Service id
        service: String,
        /// Original error returned by the operation
        #[source]
        source: BoxError,
    },

    /// The wrapped upstream call exceeded its deadline
    #[error("Upstream '{service}' timed out after {after:?}")]
    Timeout {
        /// Service id
        service: String,
        /// Configured call timeout
        after: Duration,
    },

    /// The call was interrupted because the gateway is shutting down
    #[error("Call to '{service}' cancelled by shutdown")]
    Cancelled {
        /// Service id
        service: String,
    },

    /// Route pattern could not be compiled
    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Compiler message
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convert error to HTTP status code
    pub fn to_status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::RouteNotFound(_) | Error::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            Error::ServiceUnavailable { .. } | Error::Cancelled { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Error::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error was recorded as a failure by a circuit breaker
    pub fn is_breaker_failure(&self) -> bool {
        matches!(self, Error::Upstream { .. } | Error::Timeout { .. })
    }

    /// Create an upstream error from any error type
    pub fn upstream(service: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Upstream {
            service: service.into(),
            source: source.into(),
        }
    }

    /// Create a service unavailable error
    pub fn unavailable(service: impl Into<String>) -> Self {
        Error::ServiceUnavailable {
            service: service.into(),
        }
    }
}
