//! One synchronization cycle between the local enforcer and the registry.
//!
//! A cycle reads the local banned set and the registry's blocked and allowed
//! sets (each through the cache), then runs two passes:
//!
//! 1. **allowed pass**: unban locally every IP the registry has allowed
//! 2. **blocked pass**: push local-only bans upstream and, optionally, ban
//!    locally the IPs only the registry knows about (never an allowed one)
//!
//! Every fetched set is canonicalized before it is cached, so the local and
//! registry views compare addresses rather than spellings.
//!
//! The orchestrator only routes data; every lifecycle decision belongs to the
//! registry.

use banshare_core::{canonical_ip_set, diff, ErrorClass, IpSet, StatusKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::cache::{Freshness, TtlCache, LOCAL_BANNED, REMOTE_ALLOWED, REMOTE_BLOCKED};
use crate::enforcer::LocalEnforcer;
use crate::remote::RemoteRegistry;
use crate::transfer::{BatchTransfer, TransferOutcome};
use crate::AgentError;

/// Which passes a cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Unban IPs the registry has allowed.
    pub sync_allowed_ips: bool,
    /// Ban IPs that only the registry lists as blocked.
    pub pull_remote_blocked: bool,
    /// Report IPs that only this host has banned.
    pub push_local_blocked: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            sync_allowed_ips: true,
            pull_remote_blocked: true,
            push_local_blocked: true,
        }
    }
}

/// A fetch that produced no usable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchFailure {
    /// Cache key of the set.
    pub key: &'static str,
    /// How the failure is classified.
    pub class: ErrorClass,
    /// Why the fetch failed.
    pub error: String,
}

/// Everything one cycle did and failed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Size of the local banned set.
    pub local_banned: usize,
    /// Size of the registry's blocked set.
    pub remote_blocked: usize,
    /// Size of the registry's allowed set.
    pub remote_allowed: usize,
    /// Sets that could not be fetched and had no cached fallback.
    pub fetch_failures: Vec<FetchFailure>,
    /// Sets served from an expired cache entry.
    pub stale: Vec<&'static str>,
    /// IPs unbanned locally because the registry allowed them.
    pub unbanned: IpSet,
    /// Unbans that failed, with the reason.
    pub unban_failures: BTreeMap<String, String>,
    /// IPs banned locally because the registry lists them.
    pub banned: IpSet,
    /// Local bans that failed, with the reason.
    pub ban_failures: BTreeMap<String, String>,
    /// Registry-only blocks not applied because the registry also allows them.
    pub skipped_allowed: IpSet,
    /// Result of pushing local-only bans, when anything was pushed.
    pub pushed: Option<TransferOutcome>,
}

impl CycleReport {
    /// Every item that did not succeed this cycle.
    pub fn failed_items(&self) -> IpSet {
        let mut failed: IpSet = self.unban_failures.keys().cloned().collect();
        failed.extend(self.ban_failures.keys().cloned());
        if let Some(pushed) = &self.pushed {
            failed.extend(pushed.failed_items.iter().cloned());
        }
        failed
    }

    /// True when every fetch, local change and push succeeded.
    pub fn is_clean(&self) -> bool {
        self.fetch_failures.is_empty() && self.stale.is_empty() && self.failed_items().is_empty()
    }
}

/// Drives synchronization cycles for one agent.
pub struct SyncAgent<R, E> {
    remote: R,
    enforcer: E,
    cache: TtlCache<IpSet>,
    transfer: BatchTransfer,
    options: SyncOptions,
}

impl<R: RemoteRegistry, E: LocalEnforcer> SyncAgent<R, E> {
    /// Create an agent; the cache is owned by the agent from here on.
    pub const fn new(
        remote: R,
        enforcer: E,
        cache: TtlCache<IpSet>,
        transfer: BatchTransfer,
        options: SyncOptions,
    ) -> Self {
        Self {
            remote,
            enforcer,
            cache,
            transfer,
            options,
        }
    }

    /// The list cache.
    pub const fn cache(&self) -> &TtlCache<IpSet> {
        &self.cache
    }

    /// The local enforcer.
    pub const fn enforcer(&self) -> &E {
        &self.enforcer
    }

    /// The registry handle.
    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Run one synchronization cycle.
    ///
    /// Never fails as a whole: fetch errors, local failures and rejected
    /// chunks are collected in the report.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();
        let opts = self.options;

        let local = self
            .fetch(&mut report, LOCAL_BANNED, || self.enforcer.list_banned())
            .await;
        let remote_blocked = if opts.pull_remote_blocked || opts.push_local_blocked {
            self.fetch(&mut report, REMOTE_BLOCKED, || {
                self.remote.fetch_set(StatusKind::Blocked)
            })
            .await
        } else {
            None
        };
        let remote_allowed = if opts.sync_allowed_ips || opts.pull_remote_blocked {
            self.fetch(&mut report, REMOTE_ALLOWED, || {
                self.remote.fetch_set(StatusKind::Allowed)
            })
            .await
        } else {
            None
        };

        report.local_banned = local.as_ref().map_or(0, IpSet::len);
        report.remote_blocked = remote_blocked.as_ref().map_or(0, IpSet::len);
        report.remote_allowed = remote_allowed.as_ref().map_or(0, IpSet::len);

        let Some(mut local) = local else {
            warn!("local banned set unavailable, skipping cycle passes");
            return report;
        };
        let allowed = remote_allowed.unwrap_or_default();

        if opts.sync_allowed_ips {
            self.allowed_pass(&mut report, &allowed, &local).await;
            for ip in &report.unbanned {
                local.remove(ip);
            }
        }

        match remote_blocked {
            Some(remote_blocked) => {
                self.blocked_pass(&mut report, &remote_blocked, &local, &allowed)
                    .await;
            }
            None if opts.pull_remote_blocked || opts.push_local_blocked => {
                warn!("registry blocked set unavailable, skipping blocked pass");
            }
            None => {}
        }

        if !report.unbanned.is_empty() || !report.banned.is_empty() {
            self.cache.invalidate(LOCAL_BANNED).await;
        }

        info!(
            local = report.local_banned,
            remote_blocked = report.remote_blocked,
            remote_allowed = report.remote_allowed,
            unbanned = report.unbanned.len(),
            banned = report.banned.len(),
            pushed = report.pushed.as_ref().map_or(0, |p| p.accepted),
            failed = report.failed_items().len(),
            "sync cycle finished"
        );
        report
    }

    /// Run cycles every `interval` until `shutdown` resolves.
    pub async fn run_until<S>(&self, interval: Duration, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            let report = self.run_cycle().await;
            if !report.is_clean() {
                warn!(
                    fetch_failures = report.fetch_failures.len(),
                    stale = report.stale.len(),
                    failed = report.failed_items().len(),
                    "cycle degraded"
                );
            }

            tokio::select! {
                () = &mut shutdown => {
                    info!("shutdown requested, stopping sync loop");
                    return;
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn fetch<F, Fut, Err>(
        &self,
        report: &mut CycleReport,
        key: &'static str,
        fetch: F,
    ) -> Option<IpSet>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<IpSet, Err>>,
        Err: Into<AgentError>,
    {
        let canonical = move || async move {
            let raw = fetch().await.map_err(Into::<AgentError>::into)?;
            let (set, rejected) = canonical_ip_set(&raw);
            if !rejected.is_empty() {
                warn!(key, ?rejected, "dropping entries that are not IP addresses");
            }
            Ok::<_, AgentError>(set)
        };

        match self.cache.lookup(key, canonical).await {
            Ok(lookup) => {
                if lookup.freshness == Freshness::Stale {
                    report.stale.push(key);
                }
                Some(lookup.value)
            }
            Err(e) => {
                let class = e.class();
                warn!(key, %class, error = %e, "fetch failed with no cached fallback");
                report.fetch_failures.push(FetchFailure {
                    key,
                    class,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    async fn allowed_pass(&self, report: &mut CycleReport, allowed: &IpSet, local: &IpSet) {
        let to_unban: Vec<&String> = allowed.intersection(local).collect();
        if to_unban.is_empty() {
            debug!("no allowed IPs banned locally");
            return;
        }

        info!(count = to_unban.len(), "unbanning IPs allowed by the registry");
        for ip in to_unban {
            match self.enforcer.unban(ip).await {
                Ok(()) => {
                    report.unbanned.insert(ip.clone());
                }
                Err(e) => {
                    warn!(ip = %ip, error = %e, "unban failed");
                    report.unban_failures.insert(ip.clone(), e.to_string());
                }
            }
        }
    }

    async fn blocked_pass(
        &self,
        report: &mut CycleReport,
        remote_blocked: &IpSet,
        local: &IpSet,
        allowed: &IpSet,
    ) {
        let delta = diff(remote_blocked, local);

        if self.options.push_local_blocked && !delta.to_report_upstream.is_empty() {
            info!(count = delta.to_report_upstream.len(), "pushing local-only bans");
            let pending: Vec<String> = delta.to_report_upstream.iter().cloned().collect();
            let outcome = self.transfer.send(&pending, &self.remote).await;
            if outcome.accepted > 0 {
                self.cache.invalidate(REMOTE_BLOCKED).await;
            }
            report.pushed = Some(outcome);
        }

        if self.options.pull_remote_blocked && !delta.to_apply.is_empty() {
            info!(count = delta.to_apply.len(), "applying registry-only bans");
            for ip in &delta.to_apply {
                if allowed.contains(ip) {
                    debug!(ip = %ip, "skipping ban of allowed IP");
                    report.skipped_allowed.insert(ip.clone());
                    continue;
                }
                match self.enforcer.ban(ip).await {
                    Ok(()) => {
                        report.banned.insert(ip.clone());
                    }
                    Err(e) => {
                        warn!(ip = %ip, error = %e, "ban failed");
                        report.ban_failures.insert(ip.clone(), e.to_string());
                    }
                }
            }
        }
    }
}
