//! Error types for the banshare registry.

use thiserror::Error;

/// Errors raised by the record store backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record (or its shard) is locked by another transaction.
    #[error("record store busy")]
    Busy,
}

/// Errors that can occur in registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Contention did not clear within the retry budget.
    #[error("registry unavailable: {ip} still locked after {attempts} attempts")]
    Unavailable { ip: String, attempts: u32 },

    /// No record exists for the IP.
    #[error("no record for {0}")]
    NotFound(String),

    /// Transition requested from a state that does not allow it.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// Request was malformed (missing IPs, bad address).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RegistryError {
    /// HTTP status a transport should answer with.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Unavailable { .. } => 503,
            Self::NotFound(_) => 404,
            Self::PolicyViolation(_) | Self::InvalidRequest(_) => 400,
            Self::Config(_) | Self::Io(_) => 500,
        }
    }

    /// True for contention failures a caller may retry later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}
