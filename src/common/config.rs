//! Configuration for shardmigrate components
//!
//! Values come from an optional TOML file overlaid with `SHARDMIGRATE__*`
//! environment variables (`__` separates nested keys, e.g.
//! `SHARDMIGRATE__WATCHER__INTERVAL_MS=500`).

use crate::common::{Error, Result};
use crate::coordinator::model::{Member, MemberId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

const ENV_PREFIX: &str = "SHARDMIGRATE";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root path of this service in the coordination store
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log every action/status transition (hot-reloadable)
    #[serde(default)]
    pub trace_transitions: bool,

    /// How often the config file is re-read for hot-reloadable values
    #[serde(default = "default_reload_interval")]
    pub reload_interval_ms: u64,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub watcher: WatcherConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    /// Shard members hosted on this node
    #[serde(default)]
    pub members: Vec<MemberConfig>,
}

fn default_service_name() -> String {
    "shardmigrate".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_reload_interval() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            log_level: default_log_level(),
            trace_transitions: false,
            reload_interval_ms: default_reload_interval(),
            store: StoreConfig::default(),
            watcher: WatcherConfig::default(),
            admin: AdminConfig::default(),
            members: Vec::new(),
        }
    }
}

impl Config {
    /// Load from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
        }
        let config: Config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.service_name.trim().is_empty() {
            return Err(Error::InvalidConfig("service_name cannot be empty".into()));
        }
        if self.service_name.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "service_name must be a single path segment: {}",
                self.service_name
            )));
        }
        if self.watcher.interval_ms == 0 {
            return Err(Error::InvalidConfig("watcher.interval_ms must be > 0".into()));
        }
        if self.store.poll_interval_ms == 0 {
            return Err(Error::InvalidConfig("store.poll_interval_ms must be > 0".into()));
        }
        if self.reload_interval_ms == 0 {
            return Err(Error::InvalidConfig("reload_interval_ms must be > 0".into()));
        }

        let mut seen = HashSet::new();
        for member in &self.members {
            if !seen.insert(member.member_id) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate member_id {}",
                    member.member_id
                )));
            }
            if member.shard_id.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "member {} has an empty shard_id",
                    member.member_id
                )));
            }
        }
        Ok(())
    }

    pub fn reload_interval(&self) -> Duration {
        Duration::from_millis(self.reload_interval_ms)
    }

    /// Members from the config file, in declaration order
    pub fn local_members(&self) -> Vec<Member> {
        self.members
            .iter()
            .map(|m| Member::new(m.member_id, m.shard_id.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Fs,
    Memory,
}

/// Coordination store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory backing the `fs` store
    #[serde(default = "default_store_root")]
    pub root: PathBuf,

    /// How often `fs` watches look for changes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_store_root() -> PathBuf {
    PathBuf::from("./coord-store")
}
fn default_poll_interval() -> u64 {
    200
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            root: default_store_root(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl StoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Progress watcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default = "default_watch_interval")]
    pub interval_ms: u64,

    /// Bounded wait for background tasks on stop
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

fn default_watch_interval() -> u64 {
    300
}
fn default_shutdown_timeout() -> u64 {
    5_000
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_watch_interval(),
            shutdown_timeout_ms: default_shutdown_timeout(),
        }
    }
}

impl WatcherConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Admin HTTP configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    /// Disabled when absent
    #[serde(default)]
    pub bind_addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberConfig {
    pub member_id: MemberId,
    pub shard_id: String,
}

/// Settings that may change while the coordinator runs
#[derive(Debug, Default)]
pub struct RuntimeConfig {
    trace_transitions: AtomicBool,
}

impl RuntimeConfig {
    pub fn new(trace_transitions: bool) -> Self {
        Self {
            trace_transitions: AtomicBool::new(trace_transitions),
        }
    }

    pub fn trace_transitions(&self) -> bool {
        self.trace_transitions.load(Ordering::Relaxed)
    }

    pub fn set_trace_transitions(&self, enabled: bool) {
        self.trace_transitions.store(enabled, Ordering::Relaxed);
    }

    /// Apply hot-reloadable values from a freshly loaded config
    pub fn apply(&self, config: &Config) {
        let previous = self
            .trace_transitions
            .swap(config.trace_transitions, Ordering::Relaxed);
        if previous != config.trace_transitions {
            tracing::info!(
                trace_transitions = config.trace_transitions,
                "Runtime config updated"
            );
        }
    }
}

/// Periodically re-read `path` and push hot-reloadable values into `runtime`.
///
/// A file that fails to load keeps the previous values.
pub fn spawn_reloader(
    path: PathBuf,
    runtime: Arc<RuntimeConfig>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                res = shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }
            if *shutdown.borrow() {
                break;
            }
            match Config::load(Some(&path)) {
                Ok(config) => runtime.apply(&config),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Config reload failed: {}", e)
                }
            }
        }
        tracing::debug!("Config reloader stopped");
    })
}
