//! Coordinator server: bootstrap, background tasks and shutdown

use crate::common::{Error, Result, RuntimeConfig, WatcherConfig};
use crate::coordinator::delegate::ExecutionDelegate;
use crate::coordinator::listener::ChangeListener;
use crate::coordinator::members::{MemberProvider, MemberStates, StaticMembers};
use crate::coordinator::model::{Action, Member, Status};
use crate::coordinator::processor::ActionProcessor;
use crate::coordinator::publish::StatusPublisher;
use crate::coordinator::shutdown::ShutdownHooks;
use crate::coordinator::watcher::ProgressWatcher;
use crate::store::{action_path, member_path, stat_path, CoordinationStore};
use futures_util::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct CoordinatorBuilder {
    service_name: String,
    store: Arc<dyn CoordinationStore>,
    members: Arc<dyn MemberProvider>,
    delegate: Option<Arc<dyn ExecutionDelegate>>,
    runtime: Arc<RuntimeConfig>,
    watcher: WatcherConfig,
}

impl CoordinatorBuilder {
    /// The migration engine. Required.
    pub fn delegate(mut self, delegate: Arc<dyn ExecutionDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn members(mut self, members: Arc<dyn MemberProvider>) -> Self {
        self.members = members;
        self
    }

    pub fn runtime(mut self, runtime: Arc<RuntimeConfig>) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn watcher(mut self, watcher: WatcherConfig) -> Self {
        self.watcher = watcher;
        self
    }

    pub fn build(self) -> Result<Coordinator> {
        let delegate = self.delegate.ok_or_else(|| {
            Error::InvalidConfig("an execution delegate must be bound".into())
        })?;
        if self.watcher.interval_ms == 0 {
            return Err(Error::InvalidConfig("watcher.interval_ms must be > 0".into()));
        }

        let publisher =
            StatusPublisher::new(self.store.clone(), self.service_name.clone(), self.runtime);
        let processor = ActionProcessor::new(delegate, publisher);
        let (shutdown, _) = watch::channel(false);

        Ok(Coordinator {
            service_name: self.service_name,
            store: self.store,
            provider: self.members,
            members: Arc::new(MemberStates::new()),
            listener: Arc::new(ChangeListener::new(processor.clone())),
            processor,
            watcher_config: self.watcher,
            shutdown,
            watcher_task: None,
            listener_tasks: Vec::new(),
            started: false,
        })
    }
}

/// What bootstrap found at a node
enum Loaded<T> {
    Found(T),
    Created(T),
    Malformed(String),
}

impl<T> Loaded<T> {
    fn problem(&self) -> &str {
        match self {
            Loaded::Malformed(e) => e,
            Loaded::Found(_) => "document names another member",
            Loaded::Created(_) => "created",
        }
    }
}

/// Runs the migration state machine for every member hosted on this node.
///
/// `start` bootstraps each member's action and stat nodes, resumes any
/// pending action, and launches one change listener per member plus the
/// progress watcher. `stop` consumes the coordinator, so it runs once.
pub struct Coordinator {
    service_name: String,
    store: Arc<dyn CoordinationStore>,
    provider: Arc<dyn MemberProvider>,
    members: Arc<MemberStates>,
    processor: ActionProcessor,
    listener: Arc<ChangeListener>,
    watcher_config: WatcherConfig,
    shutdown: watch::Sender<bool>,
    watcher_task: Option<JoinHandle<()>>,
    listener_tasks: Vec<JoinHandle<()>>,
    started: bool,
}

impl Coordinator {
    pub fn builder(
        service_name: impl Into<String>,
        store: Arc<dyn CoordinationStore>,
    ) -> CoordinatorBuilder {
        CoordinatorBuilder {
            service_name: service_name.into(),
            store,
            members: Arc::new(StaticMembers::default()),
            delegate: None,
            runtime: Arc::new(RuntimeConfig::default()),
            watcher: WatcherConfig::default(),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Shared member state, for observers such as the admin API
    pub fn members(&self) -> Arc<MemberStates> {
        self.members.clone()
    }

    /// Flips to `true` when the coordinator stops
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Err(Error::Internal("coordinator already started".into()));
        }
        self.started = true;

        let local = self.provider.local_members();
        tracing::info!("Starting coordinator: {}", self.service_name);
        tracing::info!("  Local members: {}", local.len());
        tracing::info!("  Watch interval: {:?}", self.watcher_config.interval());

        if let Err(e) = self.store.ensure_path(&self.service_name).await {
            tracing::warn!(path = %self.service_name, "Unable to create service root: {}", e);
        }

        for member in &local {
            if let Err(e) = self.bootstrap(member).await {
                tracing::warn!(
                    member_id = member.member_id,
                    "Unable to initialize member: {}",
                    e
                );
            }
        }

        let watcher = ProgressWatcher::new(
            self.members.clone(),
            self.processor.delegate().clone(),
            self.processor.publisher().clone(),
            self.watcher_config.interval(),
        );
        self.watcher_task = Some(watcher.spawn(self.shutdown.subscribe()));

        tracing::info!(
            "✓ Coordinator ready ({}/{} members)",
            self.members.len(),
            local.len()
        );
        Ok(())
    }

    /// Load one member's nodes and hand it to its change listener.
    ///
    /// The watch is registered before the action node is read, so a command
    /// written during bootstrap is never missed.
    async fn bootstrap(&mut self, member: &Member) -> Result<()> {
        let member_id = member.member_id;
        let action_path = action_path(&self.service_name, member_id);
        let stat_path = stat_path(&self.service_name, member_id);
        self.store
            .ensure_path(&member_path(&self.service_name, member_id))
            .await?;

        let default_status = Status::new(member);
        let (status, published) = match self.read_or_create(&stat_path, &default_status).await? {
            Loaded::Found(status) if status.member_id == member_id => (status.normalized(), true),
            Loaded::Created(status) => (status, true),
            other => {
                tracing::warn!(
                    member_id,
                    path = %stat_path,
                    "Unreadable stat document ({}), resetting to defaults",
                    other.problem()
                );
                let published = self.processor.publisher().publish(&default_status).await;
                (default_status, published)
            }
        };

        let changes = self.store.watch(&action_path).await?;

        let action = match self.read_or_create(&action_path, &Action::noop(member_id)).await? {
            Loaded::Found(action) if action.member_id == member_id => action,
            Loaded::Created(action) => action,
            other => {
                tracing::warn!(
                    member_id,
                    path = %action_path,
                    "Unreadable action document ({}), treating as NOOP",
                    other.problem()
                );
                Action::noop(member_id)
            }
        };

        transition!(
            self.processor.publisher().runtime(),
            member_id,
            mode = %status.mode,
            status = %status.status,
            action = %action.action,
            "Init member"
        );

        let slot = self
            .members
            .insert(member.clone(), status, action.clone(), published);
        let task = self.listener.clone().spawn(
            slot,
            action,
            changes,
            self.shutdown.subscribe(),
        );
        self.listener_tasks.push(task);
        Ok(())
    }

    async fn read_or_create<T>(&self, path: &str, default: &T) -> Result<Loaded<T>>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let raw = match self.store.get(path).await {
            Ok(raw) => raw,
            Err(e) if e.is_not_found() => {
                match self.store.create(path, &serde_json::to_vec(default)?).await {
                    Ok(()) => return Ok(Loaded::Created(default.clone())),
                    // Someone else created it first; use theirs
                    Err(e) if e.is_node_exists() => self.store.get(path).await?,
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };
        Ok(match serde_json::from_slice(&raw) {
            Ok(value) => Loaded::Found(value),
            Err(e) => Loaded::Malformed(e.to_string()),
        })
    }

    /// Stop background tasks (bounded wait) and close the store session
    pub async fn stop(mut self) {
        tracing::info!("Stopping coordinator: {}", self.service_name);
        self.shutdown.send_replace(true);
        let timeout = self.watcher_config.shutdown_timeout();

        if let Some(task) = self.watcher_task.take() {
            join_bounded("progress watcher", task, timeout).await;
        }
        let listeners = std::mem::take(&mut self.listener_tasks);
        join_all(
            listeners
                .into_iter()
                .map(|task| join_bounded("change listener", task, timeout)),
        )
        .await;

        self.store.close().await;
        tracing::info!("Coordinator stopped");
    }

    /// Register `stop` with the host's teardown sequence
    pub fn register_shutdown(self, hooks: &mut ShutdownHooks) {
        hooks.register("coordinator", move || self.stop());
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

async fn join_bounded(name: &str, task: JoinHandle<()>, timeout: Duration) {
    let abort = task.abort_handle();
    match tokio::time::timeout(timeout, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => tracing::error!("{} failed: {}", name, e),
        Err(_) => {
            tracing::warn!("Timed out waiting for {} to stop after {:?}", name, timeout);
            abort.abort();
        }
    }
}
