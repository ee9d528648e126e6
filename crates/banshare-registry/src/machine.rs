//! Per-IP lifecycle state machine.
//!
//! ```text
//!            report                 blocked_until passes / release
//!  (absent) ───────► Blocked ──────────────────────────────► Allowed
//!                      ▲                                        │
//!                      │ report (count + 1)                     │ allowed retention
//!                      │                                        ▼
//!                      └──────────────────────────────────── Known
//!                                                               │
//!                                last ban + known retention     ▼
//!                                                           (deleted)
//! ```
//!
//! Everything here is pure: callers supply `now` and the current record, and
//! persist whatever comes back. Time-triggered transitions are applied by
//! [`Lifecycle::sweep`], which must run before any report or release is
//! evaluated against a record.

use banshare_core::{format_span, BanPolicy, IpRecord, IpStatus, StatusKind};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How block reports for an `Allowed` IP are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllowedReportPolicy {
    /// Drop the report; the allow window wins until it elapses.
    #[default]
    Ignore,
    /// Treat the report as a reoffense and block again.
    Reblock,
}

/// How long records linger in the post-ban states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Time spent in `Allowed` before cooling to `Known`.
    pub allowed: Duration,
    /// Time after the last ban expiry before a `Known` record is deleted.
    pub known: Duration,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            allowed: Duration::minutes(2),
            known: Duration::hours(48),
        }
    }
}

/// Who reported a block, and what they attached to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Provenance string stored on the record (`identity@agent`).
    pub reported_by: String,
    /// Optional note kept on newly created records.
    pub description: Option<String>,
}

impl Report {
    /// A report with provenance only.
    #[must_use]
    pub fn new(reported_by: impl Into<String>) -> Self {
        Self {
            reported_by: reported_by.into(),
            description: None,
        }
    }
}

/// Result of evaluating a block report against the current record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// First sighting: a new record with `block_count = 1`.
    Created(IpRecord),
    /// Reoffense: the record is blocked again with an incremented count.
    Reblocked(IpRecord),
    /// Already blocked; the existing ban stands.
    AlreadyBlocked,
    /// Allowed IPs do not accept reports under [`AllowedReportPolicy::Ignore`].
    IgnoredAllowed,
}

impl ReportOutcome {
    /// The record to persist, if the report changed anything.
    #[must_use]
    pub const fn record(&self) -> Option<&IpRecord> {
        match self {
            Self::Created(record) | Self::Reblocked(record) => Some(record),
            Self::AlreadyBlocked | Self::IgnoredAllowed => None,
        }
    }

    /// True when the report produced a new ban.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        self.record().is_some()
    }
}

/// Reasons a manual release is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseRefusal {
    /// No record for the IP.
    Absent,
    /// The record is not blocked.
    NotBlocked(StatusKind),
}

/// Transition rules: ban policy, retention windows and the allowed-report policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lifecycle {
    /// Ban-duration policy consulted on every new block event.
    pub policy: BanPolicy,
    /// Post-ban retention windows.
    pub retention: Retention,
    /// Treatment of reports against allowed IPs.
    pub allowed_reports: AllowedReportPolicy,
}

impl Lifecycle {
    /// Apply time-triggered transitions; `None` means the record should be deleted.
    ///
    /// Checks ban expiry, then allow expiry, then deletion, each against the
    /// result of the previous step, so sweeping twice at the same `now` is a no-op.
    /// A deadline past the end of representable time never fires.
    #[must_use]
    pub fn sweep(&self, mut record: IpRecord, now: DateTime<Utc>) -> Option<IpRecord> {
        if let IpStatus::Blocked { blocked_until } = record.status {
            if now >= blocked_until {
                debug!(ip = %record.ip, "ban expired, moving to allowed");
                record.status = IpStatus::Allowed { allowed_since: now };
            }
        }

        if let IpStatus::Allowed { allowed_since } = record.status {
            if elapsed(now, allowed_since, self.retention.allowed) {
                debug!(ip = %record.ip, "allow window elapsed, moving to known");
                record.status = IpStatus::Known;
            }
        }

        if record.status == IpStatus::Known
            && elapsed(now, record.last_blocked_until, self.retention.known)
        {
            debug!(ip = %record.ip, "known retention elapsed, forgetting");
            return None;
        }

        Some(record)
    }

    /// Evaluate a block report against an already-swept record.
    #[must_use]
    pub fn report(
        &self,
        ip: &str,
        current: Option<&IpRecord>,
        report: &Report,
        now: DateTime<Utc>,
    ) -> ReportOutcome {
        let Some(current) = current else {
            let until = self.ban_expiry(1, now);
            let mut record = IpRecord::blocked(ip, report.reported_by.clone(), until);
            record.description.clone_from(&report.description);
            info!(
                ip,
                block_count = 1,
                duration = %format_span(self.policy.duration_for(1)),
                reported_by = %report.reported_by,
                "blocked new IP"
            );
            return ReportOutcome::Created(record);
        };

        match current.status {
            IpStatus::Blocked { .. } => ReportOutcome::AlreadyBlocked,
            IpStatus::Allowed { .. } if self.allowed_reports == AllowedReportPolicy::Ignore => {
                info!(ip, reported_by = %report.reported_by, "report ignored: IP is allowed");
                ReportOutcome::IgnoredAllowed
            }
            IpStatus::Allowed { .. } | IpStatus::Known => {
                ReportOutcome::Reblocked(self.reblock(current, report, now))
            }
        }
    }

    /// Force a blocked record into `Allowed`, regardless of its ban expiry.
    pub fn release(
        &self,
        current: Option<&IpRecord>,
        now: DateTime<Utc>,
    ) -> Result<IpRecord, ReleaseRefusal> {
        let current = current.ok_or(ReleaseRefusal::Absent)?;
        match current.status {
            IpStatus::Blocked { .. } => Ok(IpRecord {
                status: IpStatus::Allowed { allowed_since: now },
                ..current.clone()
            }),
            ref other => Err(ReleaseRefusal::NotBlocked(other.kind())),
        }
    }

    fn reblock(&self, current: &IpRecord, report: &Report, now: DateTime<Utc>) -> IpRecord {
        let block_count = current.block_count.saturating_add(1);
        let until = self.ban_expiry(block_count, now);
        info!(
            ip = %current.ip,
            block_count,
            duration = %format_span(self.policy.duration_for(block_count)),
            reported_by = %report.reported_by,
            "re-blocked returning IP"
        );
        IpRecord {
            status: IpStatus::Blocked {
                blocked_until: until,
            },
            reported_by: report.reported_by.clone(),
            block_count,
            last_blocked_until: until,
            ..current.clone()
        }
    }

    fn ban_expiry(&self, block_count: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::from_std(self.policy.duration_for(block_count))
            .ok()
            .and_then(|delta| now.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn elapsed(now: DateTime<Utc>, since: DateTime<Utc>, window: Duration) -> bool {
    since
        .checked_add_signed(window)
        .is_some_and(|deadline| now >= deadline)
}
