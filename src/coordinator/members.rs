//! Member state store
//!
//! Holds, for every locally hosted member, the last computed status and the
//! last observed action. Two paths mutate this state: the change listener
//! and the progress watcher. Each member has its own turn lock, held for the
//! whole read-compute-publish sequence, so a stale computation can never
//! overwrite a newer one. Members never wait on each other.

use crate::coordinator::model::{Action, Member, MemberId, Status};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{Mutex, MutexGuard};

/// Source of the members hosted on this node (the consensus layer)
pub trait MemberProvider: Send + Sync {
    fn local_members(&self) -> Vec<Member>;
}

/// Fixed member list, typically from the config file
#[derive(Debug, Clone, Default)]
pub struct StaticMembers(Vec<Member>);

impl StaticMembers {
    pub fn new(members: Vec<Member>) -> Self {
        Self(members)
    }
}

impl MemberProvider for StaticMembers {
    fn local_members(&self) -> Vec<Member> {
        self.0.clone()
    }
}

#[derive(Debug, Clone)]
struct MemberState {
    status: Status,
    action: Action,
    published: bool,
    updated_at: DateTime<Utc>,
}

/// Point-in-time view of one member, for observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    pub member: Member,
    pub status: Status,
    pub action: Action,
    /// Whether `status` is known to be in the coordination store
    pub published: bool,
    pub updated_at: DateTime<Utc>,
}

pub struct MemberSlot {
    member: Member,
    turn: Mutex<()>,
    state: RwLock<MemberState>,
}

impl MemberSlot {
    fn new(member: Member, status: Status, action: Action, published: bool) -> Self {
        Self {
            member,
            turn: Mutex::new(()),
            state: RwLock::new(MemberState {
                status,
                action,
                published,
                updated_at: Utc::now(),
            }),
        }
    }

    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn member_id(&self) -> MemberId {
        self.member.member_id
    }

    /// Wait for exclusive use of this member's state
    pub async fn begin(&self) -> MemberTurn<'_> {
        MemberTurn {
            _turn: self.turn.lock().await,
            slot: self,
        }
    }

    /// Exclusive use if nobody else holds it right now
    pub fn try_begin(&self) -> Option<MemberTurn<'_>> {
        self.turn.try_lock().ok().map(|turn| MemberTurn {
            _turn: turn,
            slot: self,
        })
    }

    /// Read without taking a turn. Never blocks behind a running action.
    pub fn snapshot(&self) -> MemberSnapshot {
        let state = self.read();
        MemberSnapshot {
            member: self.member.clone(),
            status: state.status.clone(),
            action: state.action.clone(),
            published: state.published,
            updated_at: state.updated_at,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemberState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemberState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one member's state, released on drop
pub struct MemberTurn<'a> {
    _turn: MutexGuard<'a, ()>,
    slot: &'a MemberSlot,
}

impl MemberTurn<'_> {
    pub fn member(&self) -> &Member {
        &self.slot.member
    }

    pub fn status(&self) -> Status {
        self.slot.read().status.clone()
    }

    pub fn action(&self) -> Action {
        self.slot.read().action.clone()
    }

    pub fn published(&self) -> bool {
        self.slot.read().published
    }

    pub fn set_action(&mut self, action: Action) {
        self.slot.write().action = action;
    }

    /// Record a newly computed status; it is unpublished until
    /// [`MemberTurn::mark_published`] says otherwise
    pub fn set_status(&mut self, status: Status) {
        let mut state = self.slot.write();
        if state.status != status {
            state.updated_at = Utc::now();
        }
        state.status = status;
        state.published = false;
    }

    pub fn mark_published(&mut self, published: bool) {
        self.slot.write().published = published;
    }
}

/// All members known to this coordinator, keyed by member id
#[derive(Default)]
pub struct MemberStates {
    slots: RwLock<BTreeMap<MemberId, Arc<MemberSlot>>>,
}

impl MemberStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a member loaded at bootstrap, replacing any previous entry
    pub fn insert(
        &self,
        member: Member,
        status: Status,
        action: Action,
        published: bool,
    ) -> Arc<MemberSlot> {
        let slot = Arc::new(MemberSlot::new(member, status, action, published));
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(slot.member_id(), slot.clone());
        slot
    }

    pub fn get(&self, member_id: MemberId) -> Option<Arc<MemberSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&member_id)
            .cloned()
    }

    /// Every slot, ordered by member id
    pub fn all(&self) -> Vec<Arc<MemberSlot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshots(&self) -> Vec<MemberSnapshot> {
        self.all().iter().map(|slot| slot.snapshot()).collect()
    }
}
