//! Action processor: applies one action to a member and publishes the result
//!
//! ```text
//! NORMAL --START_SLAVE--> SLAVE --STOP_SLAVE--> NORMAL
//! NORMAL --MIGRATE_1--> MIGRATING_1 --MIGRATE_2--> MIGRATING_2 --MIGRATE_3--> NORMAL
//! ```
//!
//! Other transitions are passed to the delegate as-is; rejecting them is
//! its job, and a rejection surfaces as `FAILED` with the mode unchanged.

use crate::coordinator::delegate::{DelegateError, ExecutionDelegate};
use crate::coordinator::members::MemberTurn;
use crate::coordinator::model::{Action, Command, Mode, Status};
use crate::coordinator::publish::StatusPublisher;
use std::sync::Arc;

#[derive(Clone)]
pub struct ActionProcessor {
    delegate: Arc<dyn ExecutionDelegate>,
    publisher: StatusPublisher,
}

impl ActionProcessor {
    pub fn new(delegate: Arc<dyn ExecutionDelegate>, publisher: StatusPublisher) -> Self {
        Self {
            delegate,
            publisher,
        }
    }

    pub fn delegate(&self) -> &Arc<dyn ExecutionDelegate> {
        &self.delegate
    }

    pub fn publisher(&self) -> &StatusPublisher {
        &self.publisher
    }

    /// Apply `action` within the caller's turn and publish the new status.
    ///
    /// NOOP returns without touching the delegate or the store. Any other
    /// action publishes unconditionally, success or failure.
    pub async fn process(&self, turn: &mut MemberTurn<'_>, action: &Action) {
        if action.is_noop() {
            return;
        }

        transition!(
            self.publisher.runtime(),
            member_id = turn.member().member_id,
            action = %action.action,
            args = ?action.args,
            "Processing action"
        );

        let current = turn.status();
        let Some(next) = self.apply(&current, action).await else {
            return;
        };
        turn.set_status(next.clone());
        let published = self.publisher.publish(&next).await;
        turn.mark_published(published);
    }

    /// Compute the status that follows `current` once `action` has run.
    ///
    /// Returns `None` for NOOP.
    pub async fn apply(&self, current: &Status, action: &Action) -> Option<Status> {
        let command = match action.command() {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!(
                    member_id = current.member_id,
                    action = %action.action,
                    "Rejected action arguments: {}",
                    e
                );
                return Some(current.failed(e.to_string()));
            }
        };

        let result = match self.execute(&command).await? {
            Ok(mode) => current.running(mode),
            Err(e) => {
                tracing::warn!(
                    member_id = current.member_id,
                    action = %action.action,
                    args = ?action.args,
                    "Cannot execute action: {}",
                    e
                );
                current.failed(e.to_string())
            }
        };
        Some(result)
    }

    /// Run the delegate call for `command`; yields the mode it leads to
    async fn execute(&self, command: &Command) -> Option<Result<Mode, DelegateError>> {
        let delegate = &self.delegate;
        let result = match command {
            Command::Noop => return None,
            Command::StartSlave {
                from_shard,
                to_shard,
                timeout,
            } => delegate
                .start_observing(from_shard, to_shard, *timeout)
                .await
                .map(|()| Mode::Slave),
            Command::StopSlave {
                from_shard,
                to_shard,
                timeout,
            } => delegate
                .stop_observing(from_shard, to_shard, *timeout)
                .await
                .map(|()| Mode::Normal),
            Command::Migrate1 {
                range,
                from_shard,
                to_shard,
                timeout,
            } => delegate
                .migrate_buckets(*range, from_shard, to_shard, *timeout)
                .await
                .map(|()| Mode::Migrating1),
            Command::Migrate2 {
                range,
                from_shard,
                to_shard,
                complete,
            } => delegate
                .set_buckets(*range, from_shard, to_shard, *complete)
                .await
                .map(|()| Mode::Migrating2),
            Command::Migrate3 {
                range,
                from_shard,
                to_shard,
                complete,
            } => delegate
                .set_buckets(*range, from_shard, to_shard, *complete)
                .await
                .map(|()| Mode::Normal),
        };
        Some(result)
    }
}
