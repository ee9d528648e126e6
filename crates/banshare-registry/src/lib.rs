//! banshare-registry: the authoritative IP ban registry.
//!
//! Agents report IPs they have blocked; the registry tracks each IP through a
//! small lifecycle and tells every agent which IPs are currently blocked or
//! allowed.
//!
//! # Lifecycle
//!
//! ```text
//!   report ──> blocked ──(ban expires / manual release)──> allowed
//!                 ^                                          │
//!                 │                           (allowed window passes)
//!            (report)                                        v
//!                 └───────────────────────────────────────  known ──(retention passes)──> forgotten
//! ```
//!
//! Repeat offenders get exponentially longer bans (see
//! [`banshare_core::compute_block_duration`]).
//!
//! # Layers
//!
//! - [`machine`] - pure transition rules, no I/O
//! - [`store`] - per-record transactional storage
//! - [`registry`] - applies transitions through the store with busy retries
//! - [`service`] - request handlers for a transport front end

pub mod clock;
pub mod config;
mod error;
pub mod machine;
pub mod registry;
pub mod service;
pub mod store;

// Re-exports for convenience.
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RegistryConfig, StoreConfig};
pub use error::{RegistryError, StoreError};
pub use machine::{AllowedReportPolicy, Lifecycle, Report, ReportOutcome, Retention};
pub use registry::{Page, Registry, ReportSummary, SweepStats};
pub use service::{CallerIdentity, RegistryService};
pub use store::{MemoryStore, Mutation, RecordStore};

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Build an in-memory registry from configuration.
pub fn from_config(config: &RegistryConfig) -> Result<Registry<MemoryStore, SystemClock>> {
    config.validate()?;
    Ok(Registry::new(
        MemoryStore::new(config.store.shards, config.lock_timeout()),
        SystemClock,
        config.lifecycle()?,
        config.retry_config(),
    ))
}
