//! Common utilities and types shared across shardmigrate

pub mod config;
pub mod error;

pub use config::{
    spawn_reloader, AdminConfig, Config, MemberConfig, RuntimeConfig, StoreBackend, StoreConfig,
    WatcherConfig,
};
pub use error::{Error, Result};
