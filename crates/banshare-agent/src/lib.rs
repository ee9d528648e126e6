//! banshare-agent: keeps a host's fail2ban jail in step with the registry.
//!
//! # Architecture
//!
//! - [`enforcer`] - the local ban mechanism ([`LocalEnforcer`], fail2ban driver)
//! - [`remote`] - the registry as seen by an agent ([`RemoteRegistry`])
//! - [`cache`] - TTL cache for the three sets a cycle reads
//! - [`transfer`] - chunked push of local-only bans
//! - [`orchestrator`] - [`SyncAgent`], which sequences one cycle
//!
//! ```rust,ignore
//! let config = AgentConfig::load(Path::new("agent.toml"))?;
//! let agent = banshare_agent::from_config(&config)?;
//! let report = agent.run_cycle().await;
//! println!("{} items failed", report.failed_items().len());
//! ```

pub mod cache;
pub mod config;
pub mod enforcer;
mod error;
pub mod orchestrator;
pub mod remote;
pub mod transfer;

// Re-exports for convenience.
pub use cache::TtlCache;
pub use config::AgentConfig;
pub use enforcer::{Fail2banEnforcer, LocalEnforcer};
pub use error::AgentError;
pub use orchestrator::{CycleReport, FetchFailure, SyncAgent, SyncOptions};
pub use remote::{HttpRegistry, RemoteRegistry};
pub use transfer::{BatchTransfer, PushChannel, TransferOutcome};

use banshare_client::RegistryClient;

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Registry client described by `config`.
pub fn client_from_config(config: &AgentConfig) -> Result<RegistryClient> {
    let client = RegistryClient::builder(&config.server_url, config.token.clone())
        .timeout(config.request_timeout())
        .retry(config.retry_config())
        .build()?;
    Ok(client)
}

/// Build a fail2ban-backed agent from configuration.
pub fn from_config(config: &AgentConfig) -> Result<SyncAgent<HttpRegistry, Fail2banEnforcer>> {
    config.validate()?;

    let remote = HttpRegistry::new(client_from_config(config)?, config.agent_name(), &config.jail)
        .with_description(config.description.clone())
        .with_page_size(config.page_size);
    let enforcer = Fail2banEnforcer::new(&config.jail, config.enforcer_timeout())
        .with_program(&config.fail2ban_client);
    let options = SyncOptions {
        sync_allowed_ips: config.sync_allowed_ips,
        pull_remote_blocked: config.pull_remote_blocked,
        push_local_blocked: config.push_local_blocked,
    };

    Ok(SyncAgent::new(
        remote,
        enforcer,
        TtlCache::new(config.cache_ttl()),
        BatchTransfer::new(config.chunk_size, config.chunk_pause())?,
        options,
    ))
}
