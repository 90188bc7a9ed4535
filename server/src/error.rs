//! Error types for the SmartQueue server.
//!
//! This module defines the error hierarchy used throughout the server. Every
//! failure a request can hit maps onto one variant of [`ServerError`], which
//! in turn maps onto exactly one HTTP status code.
//!
//! # Error Types
//!
//! - [`ConfigError`] - Configuration-related errors (missing values, parse failures)
//! - [`ServerError`] - Request-level errors: the taxonomy reported to clients
//!
//! # Example
//!
//! ```rust
//! use smartqueue_server::error::ServerError;
//!
//! fn require_provider_id(raw: Option<&str>) -> Result<&str, ServerError> {
//!     raw.ok_or_else(|| ServerError::validation("providerId is required"))
//! }
//!
//! assert!(require_provider_id(None).is_err());
//! ```

use std::error::Error;
use std::fmt;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error as ThisError;
use tracing::error;

/// Errors that occur during configuration loading and validation.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required configuration value is missing.
    #[error("missing required configuration: {0}")]
    Missing(String),

    /// A configuration value failed to parse or is invalid.
    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid {
        /// The configuration key that has an invalid value.
        key: String,
        /// Description of why the value is invalid.
        reason: String,
    },
}

/// Top-level error type for request handling.
///
/// # Error Categories
///
/// - **Unauthenticated**: missing, invalid or expired bearer token; bad credentials
/// - **Forbidden**: the caller's role does not allow the operation
/// - **NotFound**: the entry, provider or user does not exist
/// - **Conflict**: the operation collides with current state
/// - **Validation**: the request is malformed or carries an invalid value
/// - **Internal**: unexpected failures that don't fit other categories
#[derive(Debug)]
pub enum ServerError {
    /// The caller could not be authenticated.
    Unauthenticated(String),

    /// The caller is authenticated but not allowed to do this.
    Forbidden(String),

    /// The addressed resource does not exist.
    NotFound(String),

    /// The operation conflicts with the current state.
    ///
    /// Duplicate emails, joining a queue twice, starting a service that is
    /// already running and deleting one's own account all land here.
    Conflict(String),

    /// Request validation failure.
    Validation(String),

    /// Unexpected internal server error.
    Internal(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Validation(msg) => f.write_str(msg),
            Self::Internal(msg) => write!(f, "internal server error: {msg}"),
        }
    }
}

impl Error for ServerError {}

impl From<JsonRejection> for ServerError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl ServerError {
    /// Creates a new authentication error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use smartqueue_server::error::ServerError;
    ///
    /// let err = ServerError::unauthenticated("No token provided");
    /// assert!(matches!(err, ServerError::Unauthenticated(_)));
    /// ```
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated(message.into())
    }

    /// Creates a new authorization error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Creates a new not-found error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use smartqueue_server::error::ServerError;
    ///
    /// let err = ServerError::not_found("Queue entry not found");
    /// assert_eq!(err.to_string(), "Queue entry not found");
    /// ```
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a new conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates a new validation error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use smartqueue_server::error::ServerError;
    ///
    /// let err = ServerError::validation("Invalid status");
    /// assert!(matches!(err, ServerError::Validation(_)));
    /// ```
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status code reported for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable code reported alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "unauthenticated",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Validation(_) => "validation",
            Self::Internal(_) => "server_error",
        }
    }

    /// Returns `true` if this error indicates a client-side problem.
    pub fn is_client_error(&self) -> bool {
        !self.is_server_error()
    }

    /// Returns `true` if this error indicates a server-side problem.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

impl ConfigError {
    /// Creates a new missing configuration error.
    pub fn missing(key: impl Into<String>) -> Self {
        Self::Missing(key.into())
    }

    /// Creates a new invalid configuration error.
    ///
    /// # Example
    ///
    /// ```rust
    /// use smartqueue_server::error::ConfigError;
    ///
    /// let err = ConfigError::invalid("PORT", "must be a number between 1 and 65535");
    /// assert!(matches!(err, ConfigError::Invalid { .. }));
    /// ```
    pub fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
    code: &'static str,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Internal details stay in the log; clients get a generic message.
        let message = if self.is_server_error() {
            error!(error = %self, "Request failed with server error");
            "Server error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(ErrorResponse {
            message,
            code: self.code(),
        });
        (status, body).into_response()
    }
}

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
