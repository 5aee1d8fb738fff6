//! Change listener: reacts to writes on a member's action node
//!
//! Each member gets its own delivery task, so notifications for one member
//! are handled strictly in arrival order while a slow delegate call for one
//! member never delays another member's commands.
//!
//! Duplicate deliveries are not filtered: re-delivering the same command
//! calls the delegate again. Avoiding that is up to the command author.

use crate::coordinator::members::MemberSlot;
use crate::coordinator::model::Action;
use crate::coordinator::processor::ActionProcessor;
use crate::store::WatchReceiver;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct ChangeListener {
    processor: ActionProcessor,
}

impl ChangeListener {
    pub fn new(processor: ActionProcessor) -> Self {
        Self { processor }
    }

    /// Handle one notification carrying the new action document.
    ///
    /// A document that does not parse, or that names another member, is
    /// dropped without touching the member's status.
    pub async fn on_change(&self, slot: &MemberSlot, data: &[u8]) {
        let action: Action = match serde_json::from_slice(data) {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(
                    member_id = slot.member_id(),
                    "Dropping malformed action document: {}",
                    e
                );
                return;
            }
        };
        if action.member_id != slot.member_id() {
            tracing::warn!(
                member_id = slot.member_id(),
                document_member_id = action.member_id,
                "Dropping action addressed to another member"
            );
            return;
        }

        let mut turn = slot.begin().await;
        turn.set_action(action.clone());
        self.processor.process(&mut turn, &action).await;
    }

    /// Apply `pending` (the action found at bootstrap), then deliver
    /// notifications from `changes` to `slot` until the watch ends or
    /// shutdown is signalled.
    ///
    /// Resuming inside the member's own task retries a command left over
    /// from a restart without holding up other members, and always before
    /// any newer notification for this member.
    pub fn spawn(
        self: Arc<Self>,
        slot: Arc<MemberSlot>,
        pending: Action,
        mut changes: WatchReceiver,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !pending.is_noop() {
                tracing::info!(
                    member_id = slot.member_id(),
                    action = %pending.action,
                    "Resuming pending action"
                );
                let mut turn = slot.begin().await;
                self.processor.process(&mut turn, &pending).await;
            }

            loop {
                tokio::select! {
                    biased;
                    res = shutdown.changed() => {
                        if res.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    change = changes.recv() => match change {
                        Some(data) => self.on_change(&slot, &data).await,
                        None => break,
                    },
                }
            }
            tracing::debug!(member_id = slot.member_id(), "Change listener stopped");
        })
    }
}
