//! Error type definitions for the Cadenza streaming backend
//!
//! This module defines all error types used throughout the application,
//! providing a hierarchical error system that makes debugging and error
//! handling more straightforward. Every error surfaced to a client maps to
//! one of the stable wire codes returned by [`AppError::code`].

use std::collections::HashMap;

use thiserror::Error;

/// Top-level application error type
///
/// This enum represents all possible errors that can occur in the application.
/// It uses `thiserror` to provide automatic error trait implementations and
/// proper error chaining.
#[derive(Error, Debug)]
pub enum AppError {
    /// Validation errors, optionally with a field -> messages map
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        fields: Option<HashMap<String, Vec<String>>>,
    },

    /// Missing or unverifiable bearer token
    #[error("Unauthenticated: {message}")]
    Unauthenticated { message: String },

    /// Caller is authenticated but does not own the resource
    #[error("Permission denied: {action} on {resource}")]
    PermissionDenied { action: String, resource: String },

    /// Resource not found errors
    #[error("Not found: {resource} with id {id}")]
    NotFound { resource: String, id: String },

    /// Per-subscription concurrent stream cap exceeded
    #[error("Concurrent stream limit reached: {current} of {max} active")]
    ConcurrentLimit { current: u32, max: u32 },

    /// Session timed out and was reaped by the janitor
    #[error("Expired: {resource} with id {id}")]
    Expired { resource: String, id: String },

    /// A dependency fast-failed behind an open circuit breaker
    #[error("Circuit open for {service}")]
    CircuitOpen { service: String },

    /// Deadline exceeded on an outbound call
    #[error("Timeout during {operation}")]
    Timeout { operation: String },

    /// Downstream unreachable after retries were exhausted
    #[error("Unavailable: {service} - {message}")]
    Unavailable { service: String, message: String },

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Transport layer errors (storage / CDN)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Store connection failures
    #[error("Store connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Query/statement execution failures
    #[error("Query failed: {operation} - {message}")]
    QueryFailed { operation: String, message: String },

    /// Record not found
    #[error("Record not found: {entity} with {field} = {value}")]
    RecordNotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Constraint violations (unique, state machine, etc.)
    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// Data serialization/deserialization failures
    #[error("Serialization failed: {0}")]
    SerializationFailed(#[from] serde_json::Error),
}

/// Transport layer specific errors for outbound storage/CDN calls
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Deadline exceeded talking to the upstream
    #[error("Timeout after {elapsed_ms}ms: {operation}")]
    Timeout { operation: String, elapsed_ms: u64 },

    /// Connection-level failure (DNS, TLS, reset)
    #[error("Connection failed: {endpoint} - {message}")]
    Connection { endpoint: String, message: String },

    /// Upstream returned an HTTP error status
    #[error("HTTP error {status} from {endpoint}")]
    Http { endpoint: String, status: u16 },

    /// Circuit breaker refused the call without dispatching it
    #[error("Circuit open for {endpoint}")]
    CircuitOpen { endpoint: String },

    /// Retries exhausted against the endpoint
    #[error("Exhausted {attempts} attempts against {endpoint}: {message}")]
    Exhausted {
        endpoint: String,
        attempts: u32,
        message: String,
    },
}

impl AppError {
    /// Stable wire code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { .. } => "INVALID_ARGUMENT",
            AppError::Unauthenticated { .. } => "UNAUTHENTICATED",
            AppError::PermissionDenied { .. } => "PERMISSION_DENIED",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::ConcurrentLimit { .. } => "CONCURRENT_LIMIT",
            AppError::Expired { .. } => "EXPIRED",
            AppError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::Unavailable { .. } => "UNAVAILABLE",
            AppError::Repository(RepositoryError::RecordNotFound { .. }) => "NOT_FOUND",
            AppError::Repository(RepositoryError::ConnectionFailed { .. }) => "UNAVAILABLE",
            AppError::Transport(TransportError::CircuitOpen { .. }) => "CIRCUIT_OPEN",
            AppError::Transport(TransportError::Timeout { .. }) => "TIMEOUT",
            AppError::Transport(_) => "UNAVAILABLE",
            _ => "INTERNAL",
        }
    }

    /// Create a validation error with a custom message
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            fields: None,
        }
    }

    /// Create a validation error carrying a field -> messages map
    pub fn validation_fields<S: Into<String>>(
        message: S,
        fields: HashMap<String, Vec<String>>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            fields: Some(fields),
        }
    }

    /// Create an unauthenticated error
    pub fn unauthenticated<S: Into<String>>(message: S) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource: R, id: I) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl TransportError {
    /// Whether a retry against the same endpoint can reasonably succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Timeout { .. } => true,
            TransportError::Connection { .. } => true,
            TransportError::Http { status, .. } => *status >= 500 || *status == 429,
            TransportError::CircuitOpen { .. } => false,
            TransportError::Exhausted { .. } => false,
        }
    }
}

impl RepositoryError {
    /// Transient store failures are worth retrying, state errors are not
    pub fn is_retryable(&self) -> bool {
        match self {
            RepositoryError::ConnectionFailed { .. } => true,
            RepositoryError::QueryFailed { message, .. } => {
                let msg = message.to_lowercase();
                msg.contains("locked") || msg.contains("busy") || msg.contains("timeout")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_are_stable() {
        assert_eq!(AppError::validation("x").code(), "INVALID_ARGUMENT");
        assert_eq!(
            AppError::ConcurrentLimit { current: 1, max: 1 }.code(),
            "CONCURRENT_LIMIT"
        );
        assert_eq!(
            AppError::Expired {
                resource: "session".into(),
                id: "abc".into()
            }
            .code(),
            "EXPIRED"
        );
        assert_eq!(
            AppError::Transport(TransportError::CircuitOpen {
                endpoint: "cdn-1".into()
            })
            .code(),
            "CIRCUIT_OPEN"
        );
    }

    #[test]
    fn http_5xx_is_retryable_4xx_is_not() {
        let server = TransportError::Http {
            endpoint: "s".into(),
            status: 503,
        };
        let client = TransportError::Http {
            endpoint: "s".into(),
            status: 404,
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }
}
