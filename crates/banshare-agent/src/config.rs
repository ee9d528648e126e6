//! Agent configuration.

use banshare_core::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::AgentError;

/// Configuration for one synchronizing agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Registry base URL, e.g. `http://10.0.0.1:5000`.
    pub server_url: String,

    /// Bearer token presented to the registry.
    #[serde(default)]
    pub token: String,

    /// fail2ban jail to read bans from and apply bans to.
    #[serde(default = "default_jail")]
    pub jail: String,

    /// Name reported as the pushing agent (defaults to the hostname).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,

    /// Note attached to newly reported IPs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Path or name of the fail2ban client binary.
    #[serde(default = "default_fail2ban_client")]
    pub fail2ban_client: String,

    /// How long fetched lists are reused.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// IPs per push request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause between push requests (milliseconds).
    #[serde(default = "default_chunk_pause")]
    pub chunk_pause_ms: u64,

    /// Page size used when pulling lists.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Timeout for one registry request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for one enforcer command.
    #[serde(default = "default_enforcer_timeout")]
    pub enforcer_timeout_secs: u64,

    /// Delay between cycles when running continuously.
    #[serde(default = "default_sync_interval")]
    pub sync_interval_secs: u64,

    /// Unban IPs the registry has released.
    #[serde(default = "default_true")]
    pub sync_allowed_ips: bool,

    /// Ban IPs the registry knows about but this host does not.
    #[serde(default = "default_true")]
    pub pull_remote_blocked: bool,

    /// Report local bans the registry does not know about.
    #[serde(default = "default_true")]
    pub push_local_blocked: bool,

    /// Retry policy for registry requests.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Retry settings for transient registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay (milliseconds); doubles each attempt.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Cap on the retry delay (milliseconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl AgentConfig {
    /// Config pointing at `server_url` with every other field defaulted.
    #[must_use]
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            jail: default_jail(),
            agent_name: None,
            description: None,
            fail2ban_client: default_fail2ban_client(),
            cache_ttl_secs: default_cache_ttl(),
            chunk_size: default_chunk_size(),
            chunk_pause_ms: default_chunk_pause(),
            page_size: default_page_size(),
            request_timeout_secs: default_request_timeout(),
            enforcer_timeout_secs: default_enforcer_timeout(),
            sync_interval_secs: default_sync_interval(),
            sync_allowed_ips: true,
            pull_remote_blocked: true,
            push_local_blocked: true,
            retry: RetrySettings::default(),
        }
    }

    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| AgentError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(AgentError::Config("server_url is required".into()));
        }
        if self.jail.trim().is_empty() {
            return Err(AgentError::Config("jail must not be empty".into()));
        }
        if self.chunk_size == 0 {
            return Err(AgentError::Config("chunk_size must be positive".into()));
        }
        if self.page_size == 0 {
            return Err(AgentError::Config("page_size must be positive".into()));
        }
        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(AgentError::Config(format!(
                "retry.max_backoff_ms ({}) must be >= retry.initial_backoff_ms ({})",
                self.retry.max_backoff_ms, self.retry.initial_backoff_ms
            )));
        }
        Ok(())
    }

    /// Name reported to the registry: `agent_name`, else the hostname.
    #[must_use]
    pub fn agent_name(&self) -> String {
        self.agent_name.clone().unwrap_or_else(|| {
            hostname::get().map_or_else(
                |_| "unknown".to_string(),
                |h| h.to_string_lossy().into_owned(),
            )
        })
    }

    /// Retry policy for the registry client.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.retry.max_retries)
            .initial_backoff(Duration::from_millis(self.retry.initial_backoff_ms))
            .max_backoff(Duration::from_millis(self.retry.max_backoff_ms))
    }

    /// Cache freshness window.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Pause between push chunks.
    #[must_use]
    pub const fn chunk_pause(&self) -> Duration {
        Duration::from_millis(self.chunk_pause_ms)
    }

    /// Registry request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Enforcer command timeout.
    #[must_use]
    pub const fn enforcer_timeout(&self) -> Duration {
        Duration::from_secs(self.enforcer_timeout_secs)
    }

    /// Delay between continuous cycles.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// Example configuration file.
    #[must_use]
    pub fn example() -> String {
        r#"# banshare agent configuration

server_url = "http://192.168.1.1:5000"
token = "change-me"
jail = "sshd"
# agent_name = "web1"          # defaults to the hostname
# description = "sshd brute force"
fail2ban_client = "fail2ban-client"

cache_ttl_secs = 300           # reuse fetched lists for 5 minutes
chunk_size = 1000              # IPs per push request
chunk_pause_ms = 1000          # pause between push requests
page_size = 100                # items per page when pulling
request_timeout_secs = 30
enforcer_timeout_secs = 10
sync_interval_secs = 300       # delay between cycles with --watch

sync_allowed_ips = true        # unban IPs the registry released
pull_remote_blocked = true     # ban IPs reported by other agents
push_local_blocked = true      # report local bans upstream

[retry]
max_retries = 3
initial_backoff_ms = 500
max_backoff_ms = 30000
"#
        .to_string()
    }
}

// Default value functions for serde.
const fn default_true() -> bool {
    true
}

fn default_jail() -> String {
    String::from("sshd")
}

fn default_fail2ban_client() -> String {
    String::from("fail2ban-client")
}

const fn default_cache_ttl() -> u64 {
    300
}

const fn default_chunk_size() -> usize {
    1000
}

const fn default_chunk_pause() -> u64 {
    1000
}

const fn default_page_size() -> u32 {
    banshare_core::DEFAULT_PAGE_SIZE
}

const fn default_request_timeout() -> u64 {
    30
}

const fn default_enforcer_timeout() -> u64 {
    10
}

const fn default_sync_interval() -> u64 {
    300
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff() -> u64 {
    500
}

const fn default_max_backoff() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_example_parses() {
        let config = AgentConfig::from_toml(&AgentConfig::example()).unwrap();
        assert_eq!(config.server_url, "http://192.168.1.1:5000");
        assert_eq!(config.jail, "sshd");
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.cache_ttl(), Duration::from_secs(300));
        assert!(config.sync_allowed_ips);
    }

    #[test]
    fn test_minimal_file_uses_defaults() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(
            tmpfile,
            r#"
server_url = "http://registry:5000"
token = "t"
pull_remote_blocked = false
"#
        )
        .unwrap();

        let config = AgentConfig::load(tmpfile.path()).unwrap();
        let mut expected = AgentConfig::new("http://registry:5000", "t");
        expected.pull_remote_blocked = false;
        assert_eq!(config, expected);
        assert_eq!(config.retry_config().max_retries, 3);
    }

    #[test]
    fn test_missing_server_url_rejected() {
        assert!(matches!(
            AgentConfig::from_toml(r#"token = "t""#),
            Err(AgentError::Config(_))
        ));
        assert!(matches!(
            AgentConfig::from_toml(r#"server_url = " ""#),
            Err(AgentError::Config(_))
        ));
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let config = AgentConfig {
            chunk_size: 0,
            ..AgentConfig::new("http://r", "t")
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_agent_name_override() {
        let mut config = AgentConfig::new("http://r", "t");
        assert!(!config.agent_name().is_empty());
        config.agent_name = Some("web1".into());
        assert_eq!(config.agent_name(), "web1");
    }
}
