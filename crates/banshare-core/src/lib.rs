//! Core types and pure logic shared by the banshare registry and agents.
//!
//! This crate provides the foundational pieces used across the workspace:
//!
//! - **Types**: [`IpRecord`] and its tagged [`IpStatus`], plus the strict
//!   request/response shapes exchanged between agents and the registry
//! - **Policy**: exponential ban-duration backoff ([`compute_block_duration`])
//! - **Reconciliation**: set difference between local and remote views ([`diff`])
//! - **Errors**: [`ShareError`] with retry classification
//!
//! # Example
//!
//! ```rust
//! use banshare_core::{diff, ip_set};
//!
//! let remote = ip_set(["10.0.0.1", "10.0.0.2"]);
//! let local = ip_set(["10.0.0.2", "10.0.0.3"]);
//!
//! let delta = diff(&remote, &local);
//! assert!(delta.to_apply.contains("10.0.0.1"));
//! assert!(delta.to_report_upstream.contains("10.0.0.3"));
//! ```

mod error;
pub mod policy;
pub mod reconcile;
pub mod retry;
pub mod span;
pub mod types;

pub use error::{ErrorClass, Result, ShareError};
pub use policy::{compute_block_duration, BanPolicy};
pub use reconcile::{canonical_ip_set, diff, ip_set, Diff, IpSet};
pub use retry::RetryConfig;
pub use span::{format_span, parse_span};
pub use types::*;
