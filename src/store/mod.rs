//! Coordination store abstraction
//!
//! A path-addressed key-value store with change notifications, in the
//! spirit of ZooKeeper nodes. Paths are `/`-separated segments relative to
//! the store root. Each member owns two nodes under the service root:
//!
//! ```text
//! <service>/<member_id>/action   operator-written command
//! <service>/<member_id>/stat     coordinator-written status
//! ```

pub mod fs;
pub mod memory;

use crate::common::{Error, Result, StoreBackend, StoreConfig};
use crate::coordinator::model::MemberId;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

pub use fs::FsStore;
pub use memory::MemStore;

/// Stream of node contents, one item per observed change
pub type WatchReceiver = mpsc::UnboundedReceiver<Vec<u8>>;

/// Trait for coordination store backends
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Create the path (and its parents) as an empty container if absent
    async fn ensure_path(&self, path: &str) -> Result<()>;

    /// Create a node; fails with [`Error::NodeExists`] if it is already there
    async fn create(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read a node; fails with [`Error::NotFound`] if absent
    async fn get(&self, path: &str) -> Result<Vec<u8>>;

    /// Overwrite an existing node; fails with [`Error::NotFound`] if absent
    async fn set(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Subscribe to changes of a node. Only changes after registration are
    /// delivered; dropping the receiver releases the watch.
    async fn watch(&self, path: &str) -> Result<WatchReceiver>;

    /// End every watch and reject further calls with [`Error::StoreClosed`]
    async fn close(&self);
}

/// Open the backend selected in `config`
pub fn open(config: &StoreConfig) -> Result<Arc<dyn CoordinationStore>> {
    let store: Arc<dyn CoordinationStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemStore::new()),
        StoreBackend::Fs => Arc::new(FsStore::open(&config.root, config.poll_interval())?),
    };
    Ok(store)
}

pub fn member_path(service: &str, member_id: MemberId) -> String {
    format!("{}/{}", service, member_id)
}

pub fn action_path(service: &str, member_id: MemberId) -> String {
    format!("{}/{}/action", service, member_id)
}

pub fn stat_path(service: &str, member_id: MemberId) -> String {
    format!("{}/{}/stat", service, member_id)
}

/// Split a store path into its segments, rejecting empty, `.` and `..`
pub fn segments(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        return Err(Error::InvalidPath(path.to_string()));
    }
    Ok(segments)
}
