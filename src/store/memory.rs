//! In-process coordination store

use super::{segments, CoordinationStore, WatchReceiver};
use crate::common::{Error, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, Vec<u8>>,
    containers: HashSet<String>,
    watchers: HashMap<String, Vec<mpsc::UnboundedSender<Vec<u8>>>>,
    closed: bool,
}

impl Inner {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::StoreClosed);
        }
        Ok(())
    }

    fn notify(&mut self, path: &str, data: &[u8]) {
        if let Some(watchers) = self.watchers.get_mut(path) {
            watchers.retain(|tx| tx.send(data.to_vec()).is_ok());
            if watchers.is_empty() {
                self.watchers.remove(path);
            }
        }
    }
}

/// In-memory store with push notifications
#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live watches on `path`
    pub fn watch_count(&self, path: &str) -> usize {
        let mut inner = self.lock();
        match inner.watchers.get_mut(path) {
            Some(watchers) => {
                watchers.retain(|tx| !tx.is_closed());
                watchers.len()
            }
            None => 0,
        }
    }
}

#[async_trait]
impl CoordinationStore for MemStore {
    async fn ensure_path(&self, path: &str) -> Result<()> {
        let segments = segments(path)?;
        let mut inner = self.lock();
        inner.check_open()?;
        for end in 1..=segments.len() {
            inner.containers.insert(segments[..end].join("/"));
        }
        Ok(())
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<()> {
        segments(path)?;
        let mut inner = self.lock();
        inner.check_open()?;
        if inner.nodes.contains_key(path) {
            return Err(Error::NodeExists(path.to_string()));
        }
        inner.nodes.insert(path.to_string(), data.to_vec());
        inner.notify(path, data);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        segments(path)?;
        let inner = self.lock();
        inner.check_open()?;
        inner
            .nodes
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<()> {
        segments(path)?;
        let mut inner = self.lock();
        inner.check_open()?;
        match inner.nodes.get_mut(path) {
            Some(node) => *node = data.to_vec(),
            None => return Err(Error::NotFound(path.to_string())),
        }
        inner.notify(path, data);
        Ok(())
    }

    async fn watch(&self, path: &str) -> Result<WatchReceiver> {
        segments(path)?;
        let mut inner = self.lock();
        inner.check_open()?;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.watchers.entry(path.to_string()).or_default().push(tx);
        Ok(rx)
    }

    async fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.watchers.clear();
    }
}
