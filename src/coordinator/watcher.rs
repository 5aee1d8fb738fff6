//! Progress watcher
//!
//! Slave sync completes asynchronously, so no new action arrives to report
//! it. This loop polls the delegate for members that were told to
//! START_SLAVE and refines their status: RUNNING, APPROACHED or SYNCED.
//! It also republishes any status whose last write did not reach the store.

use crate::coordinator::delegate::{DelegateError, ExecutionDelegate};
use crate::coordinator::members::{MemberSlot, MemberStates, MemberTurn};
use crate::coordinator::model::{ActionKind, Mode, Status, StatusKind};
use crate::coordinator::publish::StatusPublisher;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct ProgressWatcher {
    members: Arc<MemberStates>,
    delegate: Arc<dyn ExecutionDelegate>,
    publisher: StatusPublisher,
    interval: Duration,
}

impl ProgressWatcher {
    pub fn new(
        members: Arc<MemberStates>,
        delegate: Arc<dyn ExecutionDelegate>,
        publisher: StatusPublisher,
        interval: Duration,
    ) -> Self {
        Self {
            members,
            delegate,
            publisher,
            interval,
        }
    }

    /// Run until `shutdown` flips to true. Sleeping is interrupted by the
    /// signal, so stop never waits a full interval.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::debug!(interval = ?self.interval, "Progress watcher started");
            loop {
                if *shutdown.borrow() {
                    break;
                }
                self.tick().await;
                tokio::select! {
                    res = shutdown.changed() => {
                        if res.is_err() {
                            break;
                        }
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
            tracing::debug!("Progress watcher stopped");
        })
    }

    /// One pass over every member. Members are polled concurrently; one
    /// that is busy applying an action is skipped, since the action will
    /// publish on its own.
    pub async fn tick(&self) {
        let slots = self.members.all();
        join_all(slots.iter().map(|slot| self.refresh(slot))).await;
    }

    async fn refresh(&self, slot: &MemberSlot) {
        let Some(mut turn) = slot.try_begin() else {
            tracing::trace!(member_id = slot.member_id(), "Member busy, skipping poll");
            return;
        };

        let action = turn.action();
        let current = turn.status();
        let next = match action.action {
            ActionKind::StartSlave if current.mode == Mode::Slave => {
                match action.args.from_shard.as_deref() {
                    Some(shard) => self.poll(&current, shard).await,
                    None => current.clone(),
                }
            }
            // Nothing to refine, but an unpublished status still gets retried
            ActionKind::StartSlave
            | ActionKind::Noop
            | ActionKind::StopSlave
            | ActionKind::Migrate1
            | ActionKind::Migrate2
            | ActionKind::Migrate3 => current.clone(),
        };

        self.commit(&mut turn, current, next).await;
    }

    /// Non-blocking sync check against the delegate
    async fn poll(&self, current: &Status, shard: &str) -> Status {
        match self.sync_progress(shard).await {
            Ok(status) => current.with_progress(status),
            Err(e) => {
                tracing::warn!(
                    member_id = current.member_id,
                    shard,
                    "Slave sync check failed: {}",
                    e
                );
                current.failed(e.to_string())
            }
        }
    }

    async fn sync_progress(&self, shard: &str) -> Result<StatusKind, DelegateError> {
        if self.delegate.wait_slaves_synced(shard, Duration::ZERO).await? {
            return Ok(StatusKind::Synced);
        }
        if self
            .delegate
            .wait_slaves_approaching(shard, Duration::ZERO)
            .await?
        {
            return Ok(StatusKind::Approached);
        }
        Ok(StatusKind::Running)
    }

    /// Publish when the status moved, or when the last publish never landed
    async fn commit(&self, turn: &mut MemberTurn<'_>, current: Status, next: Status) {
        if next == current && turn.published() {
            return;
        }
        if next != current {
            transition!(
                self.publisher.runtime(),
                member_id = current.member_id,
                from = %current.status,
                to = %next.status,
                "Slave progress changed"
            );
        }
        turn.set_status(next.clone());
        let published = self.publisher.publish(&next).await;
        turn.mark_published(published);
    }
}
