use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Result type alias for banshare operations
pub type Result<T> = std::result::Result<T, ShareError>;

/// Errors that can occur while talking to the registry or handling its data
#[derive(Error, Debug)]
pub enum ShareError {
    /// Authentication failed - invalid or missing token
    #[error("authentication failed: invalid token")]
    Unauthorized,

    /// Rate limit exceeded
    #[error("rate limit exceeded, retry after {retry_after:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying
        retry_after: Option<u64>,
    },

    /// Resource not found
    #[error("resource not found: {resource}")]
    NotFound {
        /// Description of the resource that wasn't found
        resource: String,
    },

    /// Registry returned an error response
    #[error("registry error ({code}): {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Error message from the registry
        message: String,
    },

    /// The registry answered with a success status but reported an error in the body
    #[error("registry rejected request: {0}")]
    Rejected(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Request timed out
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Connection failed
    #[error("connection failed: {0}")]
    Connection(String),

    /// Response body did not match the expected schema
    #[error("malformed response: {0}")]
    Malformed(String),

    /// JSON parsing/serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid IP address format
    #[error("invalid IP address: {0}")]
    InvalidIp(String),

    /// Invalid time span such as `3m` or `5w`
    #[error("invalid time span: {0}")]
    InvalidSpan(String),

    /// Invalid URL
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to decide how a failure is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Network, timeout or contention: retry with backoff, then report
    Transient,
    /// Unparseable data: treat as a failed fetch
    Malformed,
    /// Request refused by policy: log and move on
    Policy,
    /// Unrecoverable configuration or setup problem
    Fatal,
}

impl ErrorClass {
    /// Lowercase name, as used on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Malformed => "malformed",
            Self::Policy => "policy",
            Self::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ShareError {
    /// Returns true if the error is retryable
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. }
            | Self::Timeout(_)
            | Self::Connection(_)
            | Self::Http(_) => true,
            Self::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }

    /// Returns true if the error is due to authentication
    #[must_use]
    pub const fn is_auth_error(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Returns the HTTP status code if this is an API error
    #[must_use]
    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::RateLimited { .. } => Some(429),
            Self::NotFound { .. } => Some(404),
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Classify the error for cycle-level handling
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        if self.is_retryable() {
            return ErrorClass::Transient;
        }
        match self {
            Self::Malformed(_) | Self::Json(_) => ErrorClass::Malformed,
            Self::Rejected(_) | Self::NotFound { .. } | Self::InvalidIp(_) | Self::Api { .. } => {
                ErrorClass::Policy
            }
            _ => ErrorClass::Fatal,
        }
    }
}
