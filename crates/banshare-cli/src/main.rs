//! banshare - share fail2ban bans between hosts
//!
//! Runs synchronization cycles against a registry and inspects its lists.

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    banshare_cli::run().await
}
