//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};

/// Metadata store configuration.
///
/// The backend is selected by the URL scheme: `sqlite:`/`sqlite3:`,
/// `postgres[ql]://` (or `postgres[ql]+unix://`) and `mysql://`
/// (or `mysql+unix://`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Datastore URL.
    pub url: String,
    /// Connection pool overrides.
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Connection pool tuning.
///
/// Unset or zero values fall back to the backend default. SQLite always runs
/// with a single open connection; only its idle count can be overridden.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of open connections.
    #[serde(default)]
    pub max_open_conns: Option<u32>,
    /// Number of idle connections the pool tries to keep around.
    #[serde(default)]
    pub max_idle_conns: Option<u32>,
    /// How long to wait for a free connection before failing.
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_url() -> String {
    "sqlite:./data/db.sqlite".to_string()
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_open_conns: None,
            max_idle_conns: None,
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl PoolConfig {
    /// Effective max open connections, ignoring zero.
    pub fn max_open(&self) -> Option<u32> {
        self.max_open_conns.filter(|n| *n > 0)
    }

    /// Effective idle connections, ignoring zero.
    pub fn max_idle(&self) -> Option<u32> {
        self.max_idle_conns.filter(|n| *n > 0)
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            pool: PoolConfig::default(),
        }
    }
}

impl MetadataConfig {
    /// Configuration for `url` with default pool settings.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: PoolConfig::default(),
        }
    }

    /// Validate metadata configuration invariants.
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("metadata url must not be empty".to_string());
        }
        if !self.url.contains(':') {
            return Err(format!("metadata url {:?} has no scheme", self.url));
        }
        if self.pool.acquire_timeout_secs == 0 {
            return Err("pool.acquire_timeout_secs must be greater than 0".to_string());
        }
        if let (Some(open), Some(idle)) = (self.pool.max_open(), self.pool.max_idle())
            && idle > open
        {
            return Err(format!(
                "pool.max_idle_conns ({idle}) must not exceed pool.max_open_conns ({open})"
            ));
        }
        Ok(())
    }
}
