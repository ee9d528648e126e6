//! Release endpoint: manually move a blocked IP to allowed.

use crate::RegistryClient;
use banshare_core::{ReleaseRequest, ReleaseResponse, Result};

/// Release API endpoint
pub struct ReleaseApi<'a> {
    client: &'a RegistryClient,
}

impl<'a> ReleaseApi<'a> {
    pub(crate) const fn new(client: &'a RegistryClient) -> Self {
        Self { client }
    }

    /// Release a blocked IP.
    pub async fn allow(&self, ip: &str) -> Result<ReleaseResponse> {
        let request = ReleaseRequest { ip: ip.to_string() };
        self.client.post("/allow_ip", &request).await
    }
}
