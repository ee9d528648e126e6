//! Agent error types.

use banshare_core::{ErrorClass, ShareError};
use thiserror::Error;

/// Errors raised while synchronizing an agent with the registry
#[derive(Error, Debug)]
pub enum AgentError {
    /// Talking to the registry failed
    #[error(transparent)]
    Registry(#[from] ShareError),

    /// The local enforcer command ran but reported failure
    #[error("enforcer command `{command}` failed: {message}")]
    Enforcer {
        /// Command line that was run
        command: String,
        /// Exit status and stderr
        message: String,
    },

    /// The local enforcer did not answer in time
    #[error("enforcer command `{command}` timed out after {secs}s")]
    EnforcerTimeout {
        /// Command line that was run
        command: String,
        /// Timeout that expired
        secs: u64,
    },

    /// Invalid agent configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (spawning the enforcer, reading config)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// How the failure should be handled.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Registry(e) => e.class(),
            Self::Enforcer { .. } | Self::EnforcerTimeout { .. } | Self::Io(_) => {
                ErrorClass::Transient
            }
            Self::Config(_) => ErrorClass::Fatal,
        }
    }
}
