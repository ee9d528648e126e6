//! Transport-facing handlers for the registry endpoints.
//!
//! An HTTP (or any other) front end authenticates the caller, deserializes
//! the body into the typed request, and hands both to [`RegistryService`].
//! Errors carry the status code to answer with via
//! [`RegistryError::status_code`](crate::RegistryError::status_code).

use banshare_core::{
    PageRequest, PageResponse, PushRequest, PushResponse, RecordView, ReleaseRequest,
    ReleaseResponse, StatusKind,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::machine::Report;
use crate::registry::Registry;
use crate::store::RecordStore;
use crate::RegistryError;

/// Name of an authenticated caller (resolved by the transport).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerIdentity(String);

impl CallerIdentity {
    /// Wrap an already-validated caller name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The caller name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Endpoint handlers over a shared [`Registry`].
pub struct RegistryService<S, C> {
    registry: Arc<Registry<S, C>>,
}

impl<S, C> Clone for RegistryService<S, C> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: RecordStore, C: Clock> RegistryService<S, C> {
    /// Wrap a registry.
    pub fn new(registry: Registry<S, C>) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// The shared registry.
    pub fn registry(&self) -> &Registry<S, C> {
        &self.registry
    }

    /// Push endpoint: record a batch of block reports from an agent.
    #[instrument(skip(self, request), fields(caller = %caller, count = request.ips.len()))]
    pub async fn handle_push(
        &self,
        caller: &CallerIdentity,
        request: PushRequest,
    ) -> crate::Result<PushResponse> {
        if request.ips.is_empty() {
            warn!("push without any IPs");
            return Err(RegistryError::InvalidRequest("ips must not be empty".into()));
        }

        let agent = request.agent.as_deref().unwrap_or("unknown");
        let report = Report {
            reported_by: format!("{caller}@{agent}"),
            description: request.description.clone(),
        };

        let summary = self.registry.report_many(&request.ips, &report).await?;
        info!(
            accepted = summary.accepted.len(),
            already_blocked = summary.already_blocked,
            ignored_allowed = summary.ignored_allowed,
            invalid = summary.invalid.len(),
            jail = request.jail.as_deref().unwrap_or("-"),
            "processed block reports"
        );

        Ok(PushResponse {
            accepted_count: summary.accepted.len(),
            error: None,
        })
    }

    /// List endpoints: one page of records with the given status.
    #[instrument(skip(self, request), fields(page = request.page, page_size = request.page_size))]
    pub async fn handle_list(
        &self,
        status: StatusKind,
        request: &PageRequest,
    ) -> crate::Result<PageResponse> {
        if request.page == 0 {
            return Err(RegistryError::InvalidRequest("page numbers start at 1".into()));
        }
        let page = self.registry.list(status, request).await?;
        Ok(PageResponse {
            items: page.items.iter().map(RecordView::from).collect(),
            total: page.total,
        })
    }

    /// Release endpoint: manually allow a blocked IP.
    #[instrument(skip(self, request), fields(caller = %caller, ip = %request.ip))]
    pub async fn handle_release(
        &self,
        caller: &CallerIdentity,
        request: ReleaseRequest,
    ) -> crate::Result<ReleaseResponse> {
        let record = self.registry.release(&request.ip).await?;
        info!(ip = %record.ip, "manual release");
        Ok(ReleaseResponse {
            message: format!("{} released", record.ip),
        })
    }
}
