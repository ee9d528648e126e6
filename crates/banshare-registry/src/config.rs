//! Registry configuration.

use banshare_core::{parse_span, BanPolicy, RetryConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::machine::{AllowedReportPolicy, Lifecycle, Retention};
use crate::RegistryError;

/// Configuration for the authoritative registry.
///
/// Spans are written as `<n><unit>` with unit `s`, `m`, `h`, `d` or `w`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// First-offense ban (default: 3m).
    #[serde(default = "default_bantime")]
    pub bantime: String,

    /// Grow bans exponentially for repeat offenders.
    #[serde(default = "default_true")]
    pub bantime_increment: bool,

    /// Multiplier per additional block event.
    #[serde(default = "default_bantime_factor")]
    pub bantime_factor: u32,

    /// Ceiling for any single ban (default: 5w).
    #[serde(default = "default_bantime_maxtime")]
    pub bantime_maxtime: String,

    /// How long released IPs stay allowed before cooling to known (default: 2m).
    #[serde(default = "default_allowed_duration")]
    pub allowed_duration: String,

    /// How long known IPs are kept past their last ban (default: 48h).
    #[serde(default = "default_known_duration")]
    pub known_duration: String,

    /// What to do with block reports against allowed IPs.
    #[serde(default)]
    pub allowed_report_policy: AllowedReportPolicy,

    /// Record store tuning.
    #[serde(default)]
    pub store: StoreConfig,
}

/// Record store and contention settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Number of independently locked shards.
    #[serde(default = "default_shards")]
    pub shards: usize,

    /// How long a transaction waits for its record lock (milliseconds).
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Retries after a busy store before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay (milliseconds); doubles each attempt.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Cap on the retry delay (milliseconds).
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bantime: default_bantime(),
            bantime_increment: true,
            bantime_factor: default_bantime_factor(),
            bantime_maxtime: default_bantime_maxtime(),
            allowed_duration: default_allowed_duration(),
            known_duration: default_known_duration(),
            allowed_report_policy: AllowedReportPolicy::default(),
            store: StoreConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            shards: default_shards(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl RegistryConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content).map_err(|e| RegistryError::Config(e.to_string()))?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Check that every span parses and the policy is usable.
    pub fn validate(&self) -> crate::Result<()> {
        self.lifecycle()?;
        if self.store.shards == 0 {
            return Err(RegistryError::Config("store.shards must be at least 1".into()));
        }
        Ok(())
    }

    /// Ban-duration policy.
    pub fn ban_policy(&self) -> crate::Result<BanPolicy> {
        if self.bantime_factor == 0 {
            return Err(RegistryError::Config("bantime_factor must be positive".into()));
        }
        let policy = BanPolicy {
            base: span(&self.bantime)?,
            increment: self.bantime_increment,
            factor: self.bantime_factor,
            max: span(&self.bantime_maxtime)?,
        };
        if policy.max < policy.base {
            return Err(RegistryError::Config(format!(
                "bantime_maxtime ({}) is shorter than bantime ({})",
                self.bantime_maxtime, self.bantime
            )));
        }
        Ok(policy)
    }

    /// Full transition rules.
    pub fn lifecycle(&self) -> crate::Result<Lifecycle> {
        Ok(Lifecycle {
            policy: self.ban_policy()?,
            retention: Retention {
                allowed: delta(&self.allowed_duration)?,
                known: delta(&self.known_duration)?,
            },
            allowed_reports: self.allowed_report_policy,
        })
    }

    /// Backoff used when the store reports contention.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.store.max_retries)
            .initial_backoff(Duration::from_millis(self.store.initial_backoff_ms))
            .max_backoff(Duration::from_millis(self.store.max_backoff_ms))
    }

    /// Lock wait for store transactions.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.store.lock_timeout_ms)
    }
}

fn span(raw: &str) -> crate::Result<Duration> {
    parse_span(raw).map_err(|e| RegistryError::Config(e.to_string()))
}

fn delta(raw: &str) -> crate::Result<chrono::Duration> {
    chrono::Duration::from_std(span(raw)?)
        .map_err(|_| RegistryError::Config(format!("span out of range: {raw}")))
}

// Default value functions for serde.
const fn default_true() -> bool {
    true
}

fn default_bantime() -> String {
    String::from("3m")
}

const fn default_bantime_factor() -> u32 {
    24
}

fn default_bantime_maxtime() -> String {
    String::from("5w")
}

fn default_allowed_duration() -> String {
    String::from("2m")
}

fn default_known_duration() -> String {
    String::from("48h")
}

const fn default_shards() -> usize {
    crate::store::DEFAULT_SHARDS
}

const fn default_lock_timeout_ms() -> u64 {
    250
}

const fn default_max_retries() -> u32 {
    5
}

const fn default_initial_backoff_ms() -> u64 {
    100
}

const fn default_max_backoff_ms() -> u64 {
    2_000
}
