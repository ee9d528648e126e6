//! Push endpoint: report locally banned IPs to the registry.

use crate::RegistryClient;
use banshare_core::{PushRequest, PushResponse, Result};

/// Push API endpoint
pub struct PushApi<'a> {
    client: &'a RegistryClient,
}

impl<'a> PushApi<'a> {
    pub(crate) const fn new(client: &'a RegistryClient) -> Self {
        Self { client }
    }

    /// Send one push request.
    ///
    /// An `error` field in an otherwise successful reply is returned as-is;
    /// callers decide whether it fails the batch.
    pub async fn send(&self, request: &PushRequest) -> Result<PushResponse> {
        self.client.post("/add_ips", request).await
    }
}
