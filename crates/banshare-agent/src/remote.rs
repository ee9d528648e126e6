//! The registry as seen by an agent.

use async_trait::async_trait;
use banshare_client::RegistryClient;
use banshare_core::{ip_set, IpSet, PushRequest, PushResponse, ShareError, StatusKind};
use tracing::debug;

use crate::transfer::PushChannel;

/// Everything an agent needs from the registry: push plus full-set pulls.
#[async_trait]
pub trait RemoteRegistry: PushChannel {
    /// Every IP the registry currently lists under `status`.
    async fn fetch_set(&self, status: StatusKind) -> Result<IpSet, ShareError>;
}

/// [`RemoteRegistry`] over the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: RegistryClient,
    agent: String,
    jail: String,
    description: Option<String>,
    page_size: u32,
}

impl HttpRegistry {
    /// Push as `agent` on behalf of `jail`.
    pub fn new(client: RegistryClient, agent: impl Into<String>, jail: impl Into<String>) -> Self {
        Self {
            client,
            agent: agent.into(),
            jail: jail.into(),
            description: None,
            page_size: banshare_core::DEFAULT_PAGE_SIZE,
        }
    }

    /// Attach a description to every pushed chunk.
    #[must_use]
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Page size used when pulling.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// The underlying client.
    pub const fn client(&self) -> &RegistryClient {
        &self.client
    }
}

#[async_trait]
impl PushChannel for HttpRegistry {
    async fn push(&self, chunk: &[String]) -> Result<PushResponse, ShareError> {
        let request = PushRequest {
            description: self.description.clone(),
            agent: Some(self.agent.clone()),
            jail: Some(self.jail.clone()),
            ..PushRequest::new(chunk.to_vec())
        };
        self.client.push().send(&request).await
    }
}

#[async_trait]
impl RemoteRegistry for HttpRegistry {
    async fn fetch_set(&self, status: StatusKind) -> Result<IpSet, ShareError> {
        let items = self.client.list().fetch_all(status, self.page_size).await?;
        let set = ip_set(items.iter().map(|r| r.ip.as_str()));
        debug!(%status, count = set.len(), "pulled registry set");
        Ok(set)
    }
}
