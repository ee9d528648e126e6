//! Request and response bodies exchanged between agents and the registry.
//!
//! Every shape rejects unknown fields and requires its mandatory fields, so a
//! schema mismatch surfaces as a parse error instead of silently defaulting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{IpRecord, StatusKind};

/// Default page size for list endpoints
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Body of the push endpoint: IPs an agent has banned locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushRequest {
    /// IPs to report as blocked
    pub ips: Vec<String>,

    /// Free-text note stored on newly created records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Name of the reporting agent (host)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Local enforcer scope the bans came from (e.g. fail2ban jail)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jail: Option<String>,
}

impl PushRequest {
    /// Build a push request for a chunk of IPs
    #[must_use]
    pub fn new(ips: Vec<String>) -> Self {
        Self {
            ips,
            description: None,
            agent: None,
            jail: None,
        }
    }
}

/// Reply of the push endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushResponse {
    /// Number of IPs that changed state on the registry
    pub accepted_count: usize,

    /// Error reported by the registry despite a success status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Query of the list endpoints (1-indexed pages)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageRequest {
    /// Page number, starting at 1
    pub page: u32,

    /// Items per page
    pub page_size: u32,

    /// Optional substring filter on the IP
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_ip: Option<String>,
}

impl PageRequest {
    /// First page with the given size
    #[must_use]
    pub const fn first(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size,
            search_ip: None,
        }
    }

    /// The request for the following page
    #[must_use]
    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }

    /// Zero-based offset of the first item on this page
    #[must_use]
    pub fn offset(&self) -> usize {
        (self.page.max(1) as usize - 1) * self.page_size as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// Reply of the list endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PageResponse {
    /// Records on this page
    pub items: Vec<RecordView>,

    /// Total matching records across all pages
    pub total: u64,
}

/// One record as exposed by the list endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordView {
    /// The IP address
    pub ip: String,

    /// Current status
    pub status: StatusKind,

    /// Provenance of the latest accepted report
    pub reported_by: String,

    /// Free-text note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Ban expiry (blocked records only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_until: Option<DateTime<Utc>>,

    /// Release time (allowed records only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_since: Option<DateTime<Utc>>,

    /// Cumulative block events
    pub block_count: u32,
}

impl From<&IpRecord> for RecordView {
    fn from(record: &IpRecord) -> Self {
        Self {
            ip: record.ip.clone(),
            status: record.kind(),
            reported_by: record.reported_by.clone(),
            description: record.description.clone(),
            blocked_until: record.blocked_until(),
            allowed_since: record.allowed_since(),
            block_count: record.block_count,
        }
    }
}

/// Body of the manual release endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseRequest {
    /// IP to move from blocked to allowed
    pub ip: String,
}

/// Reply of the manual release endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseResponse {
    /// Human-readable confirmation
    pub message: String,
}
