//! The authoritative registry: applies lifecycle transitions through the store.
//!
//! Every mutation runs as one store transaction that first sweeps the
//! record's time-triggered transitions and then evaluates the request, so a
//! sweep and a report can never interleave on the same IP. Busy stores are
//! retried with exponential backoff before surfacing
//! [`RegistryError::Unavailable`].

use banshare_core::{format_span, normalize_ip, IpRecord, PageRequest, RetryConfig, StatusKind};
use std::future::Future;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{RegistryError, StoreError};
use crate::machine::{Lifecycle, ReleaseRefusal, Report, ReportOutcome};
use crate::store::{Mutation, RecordStore};

/// Upper bound on `page_size` for list requests.
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Counts of time-triggered transitions applied by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Blocked records whose ban expired.
    pub released: usize,
    /// Allowed records that cooled to known.
    pub cooled: usize,
    /// Known records that were deleted.
    pub forgotten: usize,
}

impl SweepStats {
    fn record(&mut self, before: &IpRecord, after: Option<&IpRecord>) {
        let after_kind = after.map(IpRecord::kind);
        if before.kind() == StatusKind::Blocked && after_kind != Some(StatusKind::Blocked) {
            self.released += 1;
        }
        if before.kind() != StatusKind::Known
            && matches!(after_kind, Some(StatusKind::Known) | None)
        {
            self.cooled += 1;
        }
        if after.is_none() {
            self.forgotten += 1;
        }
    }

    /// True when nothing changed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.released == 0 && self.cooled == 0 && self.forgotten == 0
    }
}

/// Per-IP tallies for a batch of block reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportSummary {
    /// IPs that were newly blocked or re-blocked.
    pub accepted: Vec<String>,
    /// IPs that were already blocked.
    pub already_blocked: usize,
    /// IPs dropped because they are allowed.
    pub ignored_allowed: usize,
    /// Entries that were not valid IP addresses.
    pub invalid: Vec<String>,
}

/// One page of records plus the total match count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Records on this page.
    pub items: Vec<IpRecord>,
    /// Total matching records.
    pub total: u64,
}

/// The authoritative IP registry.
pub struct Registry<S, C> {
    store: S,
    clock: C,
    lifecycle: Lifecycle,
    retry: RetryConfig,
}

impl<S: RecordStore, C: Clock> Registry<S, C> {
    /// Create a registry over a store and clock.
    pub fn new(store: S, clock: C, lifecycle: Lifecycle, retry: RetryConfig) -> Self {
        info!(
            bantime = %format_span(lifecycle.policy.base),
            increment = lifecycle.policy.increment,
            factor = lifecycle.policy.factor,
            maxtime = %format_span(lifecycle.policy.max),
            allowed_reports = ?lifecycle.allowed_reports,
            "registry ban policy"
        );
        Self {
            store,
            clock,
            lifecycle,
            retry,
        }
    }

    /// The transition rules in effect.
    pub const fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Apply time-triggered transitions to every record.
    pub async fn reconcile_expired(&self) -> crate::Result<SweepStats> {
        let keys = self.with_retry("*", || self.store.keys()).await?;
        let mut stats = SweepStats::default();

        for ip in keys {
            let now = self.clock.now();
            let lifecycle = self.lifecycle;
            let change = self
                .with_retry(&ip, || {
                    self.store.transact(&ip, move |current| {
                        let Some(before) = current else {
                            return (Mutation::Keep, None);
                        };
                        let after = lifecycle.sweep(before.clone(), now);
                        let mutation = Mutation::between(Some(before), after.clone());
                        let change = (mutation != Mutation::Keep).then(|| (before.clone(), after));
                        (mutation, change)
                    })
                })
                .await?;

            if let Some((before, after)) = change {
                stats.record(&before, after.as_ref());
            }
        }

        if !stats.is_empty() {
            debug!(
                released = stats.released,
                cooled = stats.cooled,
                forgotten = stats.forgotten,
                "expiry sweep applied"
            );
        }
        Ok(stats)
    }

    /// Report one IP as blocked.
    pub async fn report_blocked(&self, ip: &str, report: &Report) -> crate::Result<ReportOutcome> {
        let ip = normalize_ip(ip).map_err(|e| RegistryError::InvalidRequest(e.to_string()))?;
        let ip = ip.as_str();
        let lifecycle = self.lifecycle;

        self.with_retry(ip, || {
            let now = self.clock.now();
            self.store.transact(ip, move |current| {
                let swept = current.cloned().and_then(|r| lifecycle.sweep(r, now));
                let outcome = lifecycle.report(ip, swept.as_ref(), report, now);
                let after = outcome.record().cloned().or(swept);
                (Mutation::between(current, after), outcome)
            })
        })
        .await
    }

    /// Report a batch of IPs; each one is its own transaction.
    ///
    /// Invalid addresses are skipped and listed in the summary.
    pub async fn report_many<I>(&self, ips: I, report: &Report) -> crate::Result<ReportSummary>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut summary = ReportSummary::default();
        for raw in ips {
            let raw = raw.as_ref();
            match self.report_blocked(raw, report).await {
                Ok(ReportOutcome::Created(record) | ReportOutcome::Reblocked(record)) => {
                    summary.accepted.push(record.ip);
                }
                Ok(ReportOutcome::AlreadyBlocked) => summary.already_blocked += 1,
                Ok(ReportOutcome::IgnoredAllowed) => summary.ignored_allowed += 1,
                Err(RegistryError::InvalidRequest(reason)) => {
                    warn!(ip = raw, %reason, "skipping invalid IP in report");
                    summary.invalid.push(raw.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(summary)
    }

    /// Manually release a blocked IP into the allowed state.
    pub async fn release(&self, ip: &str) -> crate::Result<IpRecord> {
        let ip = normalize_ip(ip).map_err(|e| RegistryError::InvalidRequest(e.to_string()))?;
        let lifecycle = self.lifecycle;

        let result = self
            .with_retry(&ip, || {
                let now = self.clock.now();
                self.store.transact(&ip, move |current| {
                    let swept = current.cloned().and_then(|r| lifecycle.sweep(r, now));
                    match lifecycle.release(swept.as_ref(), now) {
                        Ok(released) => (
                            Mutation::between(current, Some(released.clone())),
                            Ok(released),
                        ),
                        Err(refusal) => (Mutation::between(current, swept), Err(refusal)),
                    }
                })
            })
            .await?;

        match result {
            Ok(record) => {
                info!(ip = %record.ip, "released IP");
                Ok(record)
            }
            Err(ReleaseRefusal::Absent) => {
                info!(ip = %ip, "release refused: no record");
                Err(RegistryError::NotFound(ip))
            }
            Err(ReleaseRefusal::NotBlocked(status)) => {
                info!(ip = %ip, %status, "release refused: not blocked");
                Err(RegistryError::PolicyViolation(format!(
                    "{ip} is {status}, only blocked IPs can be released"
                )))
            }
        }
    }

    /// Current record for an IP, after sweeping it.
    pub async fn get(&self, ip: &str) -> crate::Result<Option<IpRecord>> {
        let ip = normalize_ip(ip).map_err(|e| RegistryError::InvalidRequest(e.to_string()))?;
        let lifecycle = self.lifecycle;

        self.with_retry(&ip, || {
            let now = self.clock.now();
            self.store.transact(&ip, move |current| {
                let swept = current.cloned().and_then(|r| lifecycle.sweep(r, now));
                (Mutation::between(current, swept.clone()), swept)
            })
        })
        .await
    }

    /// One page of records with the given status, after a full sweep.
    pub async fn list(&self, status: StatusKind, request: &PageRequest) -> crate::Result<Page> {
        self.reconcile_expired().await?;

        let mut records = self.with_retry("*", || self.store.scan(status)).await?;
        if let Some(needle) = request.search_ip.as_deref().map(str::trim) {
            if !needle.is_empty() {
                records.retain(|r| r.ip.contains(needle));
            }
        }

        let page_size = request.page_size.clamp(1, MAX_PAGE_SIZE);
        let request = PageRequest {
            page_size,
            ..request.clone()
        };
        let total = records.len() as u64;
        let items = records
            .into_iter()
            .skip(request.offset())
            .take(page_size as usize)
            .collect();

        Ok(Page { items, total })
    }

    /// Run a store operation, retrying with backoff while the store is busy.
    async fn with_retry<T, F, Fut>(&self, ip: &str, mut op: F) -> crate::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(StoreError::Busy) if attempt < self.retry.max_retries => {
                    let backoff = self.retry.backoff_for(attempt);
                    attempt += 1;
                    warn!(
                        ip,
                        attempt,
                        max = self.retry.max_retries,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "record store busy, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(StoreError::Busy) => {
                    return Err(RegistryError::Unavailable {
                        ip: ip.to_string(),
                        attempts: attempt + 1,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::machine::{AllowedReportPolicy, Retention};
    use crate::store::MemoryStore;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::time::Duration as StdDuration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn registry() -> (Registry<MemoryStore, ManualClock>, ManualClock) {
        registry_with(Lifecycle::default())
    }

    fn registry_with(lifecycle: Lifecycle) -> (Registry<MemoryStore, ManualClock>, ManualClock) {
        let clock = ManualClock::new(t0());
        let registry = Registry::new(
            MemoryStore::default(),
            clock.clone(),
            lifecycle,
            RetryConfig::new().max_retries(2),
        );
        (registry, clock)
    }

    fn report() -> Report {
        Report::new("edge@web1")
    }

    #[tokio::test]
    async fn test_double_report_leaves_ban_unchanged() {
        let (registry, clock) = registry();
        registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        let first = registry.get("10.0.0.5").await.unwrap().unwrap();

        clock.advance(Duration::minutes(1));
        let outcome = registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        assert_eq!(outcome, ReportOutcome::AlreadyBlocked);

        let second = registry.get("10.0.0.5").await.unwrap().unwrap();
        assert_eq!(second.block_count, first.block_count);
        assert_eq!(second.blocked_until(), first.blocked_until());
    }

    #[tokio::test]
    async fn test_reoffense_scenario_grows_ban() {
        // 10.0.0.5: Blocked -> (sweep) Allowed -> (sweep) Known -> report.
        let (registry, clock) = registry();
        registry.report_blocked("10.0.0.5", &report()).await.unwrap();

        clock.advance(Duration::minutes(3));
        let stats = registry.reconcile_expired().await.unwrap();
        assert_eq!(stats.released, 1);
        let record = registry.get("10.0.0.5").await.unwrap().unwrap();
        assert_eq!(record.kind(), StatusKind::Allowed);

        // Reports while allowed are dropped.
        let outcome = registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        assert_eq!(outcome, ReportOutcome::IgnoredAllowed);

        clock.advance(Duration::minutes(2));
        let stats = registry.reconcile_expired().await.unwrap();
        assert_eq!(stats.cooled, 1);
        let record = registry.get("10.0.0.5").await.unwrap().unwrap();
        assert_eq!(record.kind(), StatusKind::Known);

        let outcome = registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        let record = outcome.record().unwrap();
        assert_eq!(record.block_count, 2);
        assert_eq!(
            record.blocked_until(),
            Some(clock.now() + Duration::minutes(72))
        );
    }

    #[tokio::test]
    async fn test_report_sweeps_before_evaluating() {
        // No explicit sweep: the report itself must see the expired ban.
        let lifecycle = Lifecycle {
            retention: Retention {
                allowed: Duration::zero(),
                known: Duration::hours(48),
            },
            ..Lifecycle::default()
        };
        let (registry, clock) = registry_with(lifecycle);
        registry.report_blocked("10.0.0.5", &report()).await.unwrap();

        clock.advance(Duration::minutes(5));
        let outcome = registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        assert!(matches!(outcome, ReportOutcome::Reblocked(ref r) if r.block_count == 2));
    }

    #[tokio::test]
    async fn test_reblock_policy_applies_to_allowed() {
        let lifecycle = Lifecycle {
            allowed_reports: AllowedReportPolicy::Reblock,
            ..Lifecycle::default()
        };
        let (registry, _clock) = registry_with(lifecycle);
        registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        registry.release("10.0.0.5").await.unwrap();

        let outcome = registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn test_known_record_is_forgotten() {
        let (registry, clock) = registry();
        registry.report_blocked("10.0.0.5", &report()).await.unwrap();

        clock.advance(Duration::minutes(3));
        registry.reconcile_expired().await.unwrap();
        clock.advance(Duration::minutes(2));
        registry.reconcile_expired().await.unwrap();

        clock.set(t0() + Duration::minutes(3) + Duration::hours(48));
        let stats = registry.reconcile_expired().await.unwrap();
        assert_eq!(stats.forgotten, 1);
        assert!(registry.get("10.0.0.5").await.unwrap().is_none());
        assert!(registry.store().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_twice_is_stable() {
        let (registry, clock) = registry();
        for ip in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            registry.report_blocked(ip, &report()).await.unwrap();
        }
        clock.advance(Duration::minutes(3));

        registry.reconcile_expired().await.unwrap();
        let after_once = registry
            .store()
            .scan(StatusKind::Allowed)
            .await
            .unwrap();
        let second = registry.reconcile_expired().await.unwrap();
        let after_twice = registry
            .store()
            .scan(StatusKind::Allowed)
            .await
            .unwrap();

        assert!(second.is_empty());
        assert_eq!(after_once, after_twice);
        assert_eq!(after_once.len(), 3);
    }

    #[tokio::test]
    async fn test_release_errors() {
        let (registry, clock) = registry();
        assert!(matches!(
            registry.release("10.0.0.9").await,
            Err(RegistryError::NotFound(_))
        ));

        registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        registry.release("10.0.0.5").await.unwrap();
        assert!(matches!(
            registry.release("10.0.0.5").await,
            Err(RegistryError::PolicyViolation(_))
        ));

        // The refusal did not change the record.
        clock.advance(Duration::seconds(1));
        let record = registry.get("10.0.0.5").await.unwrap().unwrap();
        assert_eq!(record.allowed_since(), Some(t0()));
    }

    #[tokio::test]
    async fn test_report_many_skips_invalid() {
        let (registry, _clock) = registry();
        let summary = registry
            .report_many(["10.0.0.1", "not-an-ip", "10.0.0.1", "10.0.0.2"], &report())
            .await
            .unwrap();

        assert_eq!(summary.accepted, ["10.0.0.1", "10.0.0.2"]);
        assert_eq!(summary.already_blocked, 1);
        assert_eq!(summary.invalid, ["not-an-ip"]);
    }

    #[tokio::test]
    async fn test_list_pages_and_search() {
        let (registry, _clock) = registry();
        let ips: Vec<String> = (1..=25).map(|i| format!("192.168.0.{i}")).collect();
        registry.report_many(&ips, &report()).await.unwrap();

        let page = registry
            .list(StatusKind::Blocked, &PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.items.len(), 10);

        let last = registry
            .list(StatusKind::Blocked, &PageRequest::first(10).next().next())
            .await
            .unwrap();
        assert_eq!(last.items.len(), 5);

        let search = PageRequest {
            search_ip: Some("192.168.0.2".into()),
            ..PageRequest::first(100)
        };
        let found = registry.list(StatusKind::Blocked, &search).await.unwrap();
        // .2 and .20 through .25
        assert_eq!(found.total, 7);

        let allowed = registry
            .list(StatusKind::Allowed, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(allowed.total, 0);
    }

    #[tokio::test]
    async fn test_list_sweeps_first() {
        let (registry, clock) = registry();
        registry.report_blocked("10.0.0.5", &report()).await.unwrap();
        clock.advance(Duration::minutes(3));

        let blocked = registry
            .list(StatusKind::Blocked, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(blocked.total, 0);
        let allowed = registry
            .list(StatusKind::Allowed, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(allowed.items[0].ip, "10.0.0.5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_store_surfaces_unavailable() {
        let clock = ManualClock::new(t0());
        let registry = Registry::new(
            MemoryStore::new(1, StdDuration::from_millis(10)),
            clock,
            Lifecycle::default(),
            RetryConfig::new()
                .max_retries(3)
                .initial_backoff(StdDuration::from_millis(5)),
        );

        let _guard = registry.store().hold_shard_of("10.0.0.5").await;
        let result = registry.report_blocked("10.0.0.5", &report()).await;
        assert!(matches!(
            result,
            Err(RegistryError::Unavailable { attempts: 4, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_store_recovers_within_retries() {
        let clock = ManualClock::new(t0());
        let registry = std::sync::Arc::new(Registry::new(
            MemoryStore::new(1, StdDuration::from_millis(10)),
            clock,
            Lifecycle::default(),
            RetryConfig::new()
                .max_retries(5)
                .initial_backoff(StdDuration::from_millis(20)),
        ));

        let guard = registry.store().hold_shard_of("10.0.0.5").await;
        let task = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.report_blocked("10.0.0.5", &report()).await })
        };
        tokio::time::sleep(StdDuration::from_millis(30)).await;
        drop(guard);

        let outcome = task.await.unwrap().unwrap();
        assert!(outcome.is_accepted());
    }

    #[tokio::test]
    async fn test_unrepresentable_known_retention_does_not_break_listing() {
        let config = crate::RegistryConfig {
            known_duration: "20000000w".into(),
            ..crate::RegistryConfig::default()
        };
        config.validate().unwrap();
        let (registry, clock) = registry_with(config.lifecycle().unwrap());
        registry.report_blocked("10.0.0.5", &report()).await.unwrap();

        clock.advance(Duration::minutes(3));
        registry.reconcile_expired().await.unwrap();
        clock.advance(Duration::minutes(2));
        registry.reconcile_expired().await.unwrap();

        let known = registry
            .list(StatusKind::Known, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(known.total, 1);
        assert_eq!(known.items[0].ip, "10.0.0.5");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reports_for_same_ip_are_serialized() {
        const REPORTERS: usize = 16;
        let (registry, _clock) = registry();
        let registry = std::sync::Arc::new(registry);

        let tasks: Vec<_> = (0..REPORTERS)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let report = Report::new(format!("edge@web{i}"));
                    registry.report_blocked("10.0.0.5", &report).await
                })
            })
            .collect();

        let mut created = 0;
        let mut already_blocked = 0;
        for task in tasks {
            match task.await.unwrap().unwrap() {
                ReportOutcome::Created(_) => created += 1,
                ReportOutcome::AlreadyBlocked => already_blocked += 1,
                other => panic!("unexpected outcome {other:?}"),
            }
        }
        assert_eq!(created, 1);
        assert_eq!(already_blocked, REPORTERS - 1);

        let record = registry.get("10.0.0.5").await.unwrap().unwrap();
        assert_eq!(record.block_count, 1);
        assert_eq!(record.kind(), StatusKind::Blocked);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_release_racing_report_lands_in_one_order() {
        let (registry, _clock) = registry_with(Lifecycle {
            allowed_reports: AllowedReportPolicy::Reblock,
            ..Lifecycle::default()
        });
        let registry = std::sync::Arc::new(registry);
        let ips: Vec<String> = (1..=20).map(|i| format!("10.0.1.{i}")).collect();
        registry.report_many(&ips, &report()).await.unwrap();

        for ip in ips {
            let release = {
                let registry = registry.clone();
                let ip = ip.clone();
                tokio::spawn(async move { registry.release(&ip).await })
            };
            let reblock = {
                let registry = registry.clone();
                let ip = ip.clone();
                tokio::spawn(async move { registry.report_blocked(&ip, &report()).await })
            };

            let released = release.await.unwrap().unwrap();
            assert_eq!(released.block_count, 1);
            let outcome = reblock.await.unwrap().unwrap();
            let record = registry.get(&ip).await.unwrap().unwrap();

            match outcome {
                // Report ran first and saw the original ban; release then won.
                ReportOutcome::AlreadyBlocked => {
                    assert_eq!(record.kind(), StatusKind::Allowed);
                    assert_eq!(record.block_count, 1);
                }
                // Release ran first; the report re-blocked the allowed record.
                ReportOutcome::Reblocked(_) => {
                    assert_eq!(record.kind(), StatusKind::Blocked);
                    assert_eq!(record.block_count, 2);
                }
                other => panic!("unexpected outcome for {ip}: {other:?}"),
            }
        }
    }
}
