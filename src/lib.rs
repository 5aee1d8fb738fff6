//! # shardmigrate
//!
//! Control-plane coordinator for moving bucket ranges between shards of a
//! consensus-backed cluster:
//! - One coordinator per host, driving every locally hosted shard member
//! - Commands (actions) and reports (status) exchanged through a shared
//!   coordination store
//! - Change-driven command processing plus poll-driven sync progress
//! - Per-member serialization, no global lock
//!
//! ## Architecture
//!
//! ```text
//!   operator tool
//!        │ writes <service>/<member>/action
//! ┌──────▼──────────────────────────────────┐
//! │         Coordination store              │
//! └──────┬───────────────────────▲──────────┘
//!        │ watch                 │ <service>/<member>/stat
//! ┌──────▼───────────┐   ┌───────┴──────────┐
//! │ Change listener  │   │ Progress watcher │
//! │ (task / member)  │   │ (every 300 ms)   │
//! └──────┬───────────┘   └───────▲──────────┘
//!        │ action processor      │ wait_slaves_*
//! ┌──────▼───────────────────────┴──────────┐
//! │          Execution delegate             │
//! │  (bucket migration, slave replication)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! shardmigrate-coord serve --config ./coord.toml
//! ```
//!
//! An operator then issues a command by rewriting a member's action node:
//!
//! ```json
//! {"memberId": 81, "action": "START_SLAVE",
//!  "args": {"fromShard": "shard1", "toShard": "shard2", "timeoutMs": 30000}}
//! ```

pub mod common;
pub mod coordinator;
pub mod store;

// Re-export commonly used types
pub use common::{Config, Error, Result};
pub use coordinator::Coordinator;
pub use store::CoordinationStore;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
