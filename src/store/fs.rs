//! Directory-backed coordination store
//!
//! Every node is a file below `root`; containers are directories. Writes go
//! to a temporary sibling first and are then linked or renamed into place,
//! so readers never observe a partially written document. Watches poll the
//! file and report every write, identical rewrites included, which lets an
//! operator tool in another process drive the coordinator by editing action
//! files.

use super::{segments, CoordinationStore, WatchReceiver};
use crate::common::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};

pub struct FsStore {
    root: PathBuf,
    poll_interval: Duration,
    closed: watch::Sender<bool>,
}

impl FsStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>, poll_interval: Duration) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let (closed, _) = watch::channel(false);
        Ok(Self {
            root,
            poll_interval,
            closed,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn check_open(&self) -> Result<()> {
        if *self.closed.borrow() {
            return Err(Error::StoreClosed);
        }
        Ok(())
    }

    fn node_path(&self, path: &str) -> Result<PathBuf> {
        let mut file = self.root.clone();
        for segment in segments(path)? {
            file.push(segment);
        }
        Ok(file)
    }

    /// Write `data` next to `target` under a unique temporary name
    async fn write_temp(&self, target: &Path, data: &[u8]) -> Result<PathBuf> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let parent = target
            .parent()
            .ok_or_else(|| Error::Internal(format!("node without parent: {}", target.display())))?;
        tokio::fs::create_dir_all(parent).await?;

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = parent.join(format!(
            ".{}.{}-{}.tmp",
            name,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&temp, data).await?;
        Ok(temp)
    }
}

fn map_not_found(e: std::io::Error, path: &str) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::NotFound(path.to_string())
    } else {
        Error::Io(e)
    }
}

/// Identity of one write to a node file. Every `set` renames a fresh file
/// into place and in-place edits bump the mtime, so rewriting identical
/// bytes still counts as a change.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Version {
    modified: Option<SystemTime>,
    len: u64,
    #[cfg(unix)]
    ino: u64,
}

impl Version {
    fn of(meta: &std::fs::Metadata) -> Self {
        Self {
            modified: meta.modified().ok(),
            len: meta.len(),
            #[cfg(unix)]
            ino: std::os::unix::fs::MetadataExt::ino(meta),
        }
    }
}

#[async_trait]
impl CoordinationStore for FsStore {
    async fn ensure_path(&self, path: &str) -> Result<()> {
        self.check_open()?;
        let dir = self.node_path(path)?;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(())
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<()> {
        self.check_open()?;
        let target = self.node_path(path)?;
        let temp = self.write_temp(&target, data).await?;

        // hard_link refuses to replace an existing file, which gives
        // create-if-absent without exposing a half-written node
        let linked = tokio::fs::hard_link(&temp, &target).await;
        let _ = tokio::fs::remove_file(&temp).await;
        match linked {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(Error::NodeExists(path.to_string()))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.check_open()?;
        let file = self.node_path(path)?;
        tokio::fs::read(&file)
            .await
            .map_err(|e| map_not_found(e, path))
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<()> {
        self.check_open()?;
        let target = self.node_path(path)?;
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(Error::Store(format!("{} is a container", path))),
            Err(e) => return Err(map_not_found(e, path)),
        }

        let temp = self.write_temp(&target, data).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(Error::Io(e));
        }
        Ok(())
    }

    async fn watch(&self, path: &str) -> Result<WatchReceiver> {
        self.check_open()?;
        let file = self.node_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut closed = self.closed.subscribe();
        let poll_interval = self.poll_interval;
        let path = path.to_string();

        let mut last = tokio::fs::metadata(&file).await.ok().map(|m| Version::of(&m));

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    res = closed.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                    _ = tx.closed() => break,
                    _ = tokio::time::sleep(poll_interval) => {}
                }
                if *closed.borrow() {
                    break;
                }

                let version = match tokio::fs::metadata(&file).await {
                    Ok(meta) => Version::of(&meta),
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        last = None;
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!(path = %path, "Watch poll failed: {}", e);
                        continue;
                    }
                };
                if last.as_ref() == Some(&version) {
                    continue;
                }
                match tokio::fs::read(&file).await {
                    Ok(data) => {
                        last = Some(version);
                        if tx.send(data).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == ErrorKind::NotFound => last = None,
                    Err(e) => tracing::warn!(path = %path, "Watch poll failed: {}", e),
                }
            }
            tracing::debug!(path = %path, "Watch released");
        });

        Ok(rx)
    }

    async fn close(&self) {
        self.closed.send_replace(true);
    }
}
