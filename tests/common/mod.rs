//! Shared fixtures for coordinator integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use shardmigrate::common::{Error, Result, WatcherConfig};
use shardmigrate::coordinator::{
    Action, ActionKind, BucketRange, Coordinator, DelegateError, ExecutionDelegate, Member,
    MemberId, StaticMembers, Status,
};
use shardmigrate::store::{action_path, stat_path, CoordinationStore, MemStore, WatchReceiver};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const SERVICE: &str = "svc";

/// Scripted execution delegate
#[derive(Default)]
pub struct MockDelegate {
    calls: Mutex<Vec<String>>,
    failures: Mutex<HashMap<&'static str, String>>,
    delays: Mutex<HashMap<String, Duration>>,
    synced: AtomicBool,
    approaching: AtomicBool,
    poll_error: Mutex<Option<String>>,
}

impl MockDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every call to `op` fail with `message`
    pub fn fail(&self, op: &'static str, message: &str) {
        self.failures.lock().unwrap().insert(op, message.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    /// Calls targeting `to_shard` take `delay` before returning
    pub fn delay_for(&self, to_shard: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert(to_shard.to_string(), delay);
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::SeqCst);
    }

    pub fn set_approaching(&self, approaching: bool) {
        self.approaching.store(approaching, Ordering::SeqCst);
    }

    pub fn fail_polls(&self, message: Option<&str>) {
        *self.poll_error.lock().unwrap() = message.map(str::to_string);
    }

    /// Operation names, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, op: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == op).count()
    }

    async fn run(&self, op: &'static str, to_shard: &str) -> std::result::Result<(), DelegateError> {
        let delay = self.delays.lock().unwrap().get(to_shard).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(op.to_string());
        match self.failures.lock().unwrap().get(op) {
            Some(message) => Err(DelegateError::Rejected(message.clone())),
            None => Ok(()),
        }
    }

    fn poll(&self, flag: &AtomicBool) -> std::result::Result<bool, DelegateError> {
        if let Some(message) = self.poll_error.lock().unwrap().clone() {
            return Err(DelegateError::Unavailable(message));
        }
        Ok(flag.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl ExecutionDelegate for MockDelegate {
    async fn start_observing(
        &self,
        _from_shard: &str,
        to_shard: &str,
        _timeout: Duration,
    ) -> std::result::Result<(), DelegateError> {
        self.run("start_observing", to_shard).await
    }

    async fn stop_observing(
        &self,
        _from_shard: &str,
        to_shard: &str,
        _timeout: Duration,
    ) -> std::result::Result<(), DelegateError> {
        self.run("stop_observing", to_shard).await
    }

    async fn migrate_buckets(
        &self,
        _range: BucketRange,
        _from_shard: &str,
        to_shard: &str,
        _timeout: Duration,
    ) -> std::result::Result<(), DelegateError> {
        self.run("migrate_buckets", to_shard).await
    }

    async fn set_buckets(
        &self,
        _range: BucketRange,
        _from_shard: &str,
        to_shard: &str,
        _complete: bool,
    ) -> std::result::Result<(), DelegateError> {
        self.run("set_buckets", to_shard).await
    }

    async fn wait_slaves_synced(
        &self,
        _shard: &str,
        timeout: Duration,
    ) -> std::result::Result<bool, DelegateError> {
        assert_eq!(timeout, Duration::ZERO, "sync checks must not block");
        self.poll(&self.synced)
    }

    async fn wait_slaves_approaching(
        &self,
        _shard: &str,
        timeout: Duration,
    ) -> std::result::Result<bool, DelegateError> {
        assert_eq!(timeout, Duration::ZERO, "sync checks must not block");
        self.poll(&self.approaching)
    }
}

/// MemStore wrapper that can be told to fail writes
pub struct FlakyStore {
    inner: Arc<MemStore>,
    fail_writes: AtomicBool,
    fail_prefix: Mutex<Option<String>>,
}

impl FlakyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(MemStore::new()),
            fail_writes: AtomicBool::new(false),
            fail_prefix: Mutex::new(None),
        })
    }

    /// The underlying store, unaffected by injected failures
    pub fn inner(&self) -> Arc<MemStore> {
        self.inner.clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Fail every operation on paths starting with `prefix`
    pub fn fail_prefix(&self, prefix: Option<&str>) {
        *self.fail_prefix.lock().unwrap() = prefix.map(str::to_string);
    }

    fn check(&self, path: &str, write: bool) -> Result<()> {
        if write && self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Store(format!("injected write failure on {}", path)));
        }
        if let Some(prefix) = self.fail_prefix.lock().unwrap().as_deref() {
            if path.starts_with(prefix) {
                return Err(Error::Store(format!("injected failure on {}", path)));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CoordinationStore for FlakyStore {
    async fn ensure_path(&self, path: &str) -> Result<()> {
        self.check(path, true)?;
        self.inner.ensure_path(path).await
    }

    async fn create(&self, path: &str, data: &[u8]) -> Result<()> {
        self.check(path, true)?;
        self.inner.create(path, data).await
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.check(path, false)?;
        self.inner.get(path).await
    }

    async fn set(&self, path: &str, data: &[u8]) -> Result<()> {
        self.check(path, true)?;
        self.inner.set(path, data).await
    }

    async fn watch(&self, path: &str) -> Result<WatchReceiver> {
        self.check(path, false)?;
        self.inner.watch(path).await
    }

    async fn close(&self) {
        self.inner.close().await
    }
}

pub fn fast_watcher() -> WatcherConfig {
    WatcherConfig {
        interval_ms: 20,
        shutdown_timeout_ms: 1_000,
    }
}

pub fn coordinator(
    store: Arc<dyn CoordinationStore>,
    delegate: Arc<MockDelegate>,
    members: Vec<Member>,
) -> Coordinator {
    Coordinator::builder(SERVICE, store)
        .delegate(delegate)
        .members(Arc::new(StaticMembers::new(members)))
        .watcher(fast_watcher())
        .build()
        .unwrap()
}

pub fn action(member_id: MemberId, kind: ActionKind, to_shard: &str) -> Action {
    let mut action = Action::noop(member_id);
    action.action = kind;
    action.args.from_shard = Some("shard1".to_string());
    action.args.to_shard = Some(to_shard.to_string());
    action.args.range_start = 0;
    action.args.range_stop = 127;
    action.args.timeout_ms = 1_000;
    action.args.complete = kind == ActionKind::Migrate3;
    action
}

pub async fn write_action(store: &dyn CoordinationStore, action: &Action) {
    let path = action_path(SERVICE, action.member_id);
    store
        .set(&path, &serde_json::to_vec(action).unwrap())
        .await
        .unwrap();
}

pub async fn read_status(store: &dyn CoordinationStore, member_id: MemberId) -> Status {
    let raw = store.get(&stat_path(SERVICE, member_id)).await.unwrap();
    serde_json::from_slice(&raw).unwrap()
}

/// Poll `check` until it holds or `timeout` passes
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
