use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::ShareError;

/// Lifecycle status of an IP, carrying the timestamp that only exists in that state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IpStatus {
    /// Banned until the given instant
    Blocked {
        /// When the ban expires
        blocked_until: DateTime<Utc>,
    },
    /// Explicitly forgiven; further block reports are held off
    Allowed {
        /// When the IP was released
        allowed_since: DateTime<Utc>,
    },
    /// Cooldown bucket before the record is forgotten
    Known,
}

impl IpStatus {
    /// The status without its payload
    #[must_use]
    pub const fn kind(&self) -> StatusKind {
        match self {
            Self::Blocked { .. } => StatusKind::Blocked,
            Self::Allowed { .. } => StatusKind::Allowed,
            Self::Known => StatusKind::Known,
        }
    }
}

/// Payload-free status, used for listing and on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Currently banned
    Blocked,
    /// Explicitly allowed
    Allowed,
    /// Cooling down before deletion
    Known,
}

impl StatusKind {
    /// All statuses, in lifecycle order
    pub const ALL: [Self; 3] = [Self::Blocked, Self::Allowed, Self::Known];

    /// Lowercase name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Allowed => "allowed",
            Self::Known => "known",
        }
    }
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusKind {
    type Err = ShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "blocked" => Ok(Self::Blocked),
            "allowed" => Ok(Self::Allowed),
            "known" => Ok(Self::Known),
            other => Err(ShareError::Malformed(format!("unknown status `{other}`"))),
        }
    }
}

/// Registry row for one IP address.
///
/// The status timestamp lives inside [`IpStatus`], so a `Known` record can
/// never carry `blocked_until` or `allowed_since`. `last_blocked_until`
/// survives the status changes and drives final deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpRecord {
    /// The IP address (unique key)
    pub ip: String,

    /// Current lifecycle status
    #[serde(flatten)]
    pub status: IpStatus,

    /// Provenance of the latest accepted report, `identity@agent`
    pub reported_by: String,

    /// Free-text note supplied with the first report
    #[serde(default)]
    pub description: Option<String>,

    /// Cumulative block events, never reset
    pub block_count: u32,

    /// Expiry of the most recent ban
    pub last_blocked_until: DateTime<Utc>,
}

impl IpRecord {
    /// Create a freshly blocked record (first report)
    #[must_use]
    pub fn blocked(
        ip: impl Into<String>,
        reported_by: impl Into<String>,
        blocked_until: DateTime<Utc>,
    ) -> Self {
        Self {
            ip: ip.into(),
            status: IpStatus::Blocked { blocked_until },
            reported_by: reported_by.into(),
            description: None,
            block_count: 1,
            last_blocked_until: blocked_until,
        }
    }

    /// Payload-free status
    #[must_use]
    pub const fn kind(&self) -> StatusKind {
        self.status.kind()
    }

    /// Ban expiry, only while blocked
    #[must_use]
    pub const fn blocked_until(&self) -> Option<DateTime<Utc>> {
        match self.status {
            IpStatus::Blocked { blocked_until } => Some(blocked_until),
            _ => None,
        }
    }

    /// Release time, only while allowed
    #[must_use]
    pub const fn allowed_since(&self) -> Option<DateTime<Utc>> {
        match self.status {
            IpStatus::Allowed { allowed_since } => Some(allowed_since),
            _ => None,
        }
    }
}

/// Validate and normalize an IP string (trims whitespace, canonical form)
pub fn normalize_ip(raw: &str) -> crate::Result<String> {
    let trimmed = raw.trim();
    trimmed
        .parse::<std::net::IpAddr>()
        .map(|ip| ip.to_string())
        .map_err(|_| ShareError::InvalidIp(trimmed.to_string()))
}
