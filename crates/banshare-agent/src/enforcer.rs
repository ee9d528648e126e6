//! Local enforcement: the firewall-side view of banned IPs.

use async_trait::async_trait;
use banshare_core::IpSet;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::AgentError;

/// Marker that precedes the banned IPs in `fail2ban-client status <jail>`.
const BANNED_LIST_MARKER: &str = "Banned IP list:";

/// The local ban mechanism an agent synchronizes.
#[async_trait]
pub trait LocalEnforcer: Send + Sync {
    /// IPs currently banned locally.
    async fn list_banned(&self) -> crate::Result<IpSet>;

    /// Ban one IP.
    async fn ban(&self, ip: &str) -> crate::Result<()>;

    /// Lift the ban on one IP.
    async fn unban(&self, ip: &str) -> crate::Result<()>;
}

/// Drives a fail2ban jail through `fail2ban-client`.
#[derive(Debug, Clone)]
pub struct Fail2banEnforcer {
    program: String,
    jail: String,
    timeout: Duration,
}

impl Fail2banEnforcer {
    /// Enforcer for `jail`, using the `fail2ban-client` found on `PATH`.
    pub fn new(jail: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: "fail2ban-client".to_string(),
            jail: jail.into(),
            timeout,
        }
    }

    /// Use a different client binary.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// The jail this enforcer drives.
    pub fn jail(&self) -> &str {
        &self.jail
    }

    async fn run(&self, args: &[&str]) -> crate::Result<String> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        debug!(command = %command_line, "running enforcer command");

        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AgentError::EnforcerTimeout {
                command: command_line.clone(),
                secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            return Err(AgentError::Enforcer {
                command: command_line,
                message: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl LocalEnforcer for Fail2banEnforcer {
    #[instrument(skip(self), fields(jail = %self.jail))]
    async fn list_banned(&self) -> crate::Result<IpSet> {
        let stdout = self.run(&["status", self.jail.as_str()]).await?;
        let banned = parse_banned_list(&stdout);
        debug!(count = banned.len(), "read local bans");
        Ok(banned)
    }

    async fn ban(&self, ip: &str) -> crate::Result<()> {
        self.run(&["set", self.jail.as_str(), "banip", ip]).await.map(drop)
    }

    async fn unban(&self, ip: &str) -> crate::Result<()> {
        self.run(&["set", self.jail.as_str(), "unbanip", ip]).await.map(drop)
    }
}

/// Extract the banned IPs from `fail2ban-client status <jail>` output.
///
/// Returns an empty set when the marker line is missing.
pub fn parse_banned_list(output: &str) -> IpSet {
    output
        .lines()
        .find_map(|line| {
            line.find(BANNED_LIST_MARKER)
                .map(|at| &line[at + BANNED_LIST_MARKER.len()..])
        })
        .map(|list| list.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
