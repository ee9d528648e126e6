//! Command implementations.

pub mod config;
pub mod list;
pub mod release;
pub mod status;
pub mod sync;

use banshare_agent::AgentConfig;
use banshare_client::RegistryClient;
use std::path::PathBuf;

use crate::config::Overrides;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Agent configuration file
    pub config_path: PathBuf,

    /// Server and token given on the command line
    pub overrides: Overrides,

    /// Print JSON instead of text
    pub json: bool,
}

impl Context {
    /// Load the agent configuration with overrides applied.
    pub fn agent_config(&self) -> anyhow::Result<AgentConfig> {
        crate::config::load(&self.config_path, &self.overrides)
    }

    /// Registry client for the configured server.
    pub fn client(&self) -> anyhow::Result<RegistryClient> {
        let config = self.agent_config()?;
        Ok(banshare_agent::client_from_config(&config)?)
    }
}
