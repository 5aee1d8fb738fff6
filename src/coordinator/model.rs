//! Action and status documents exchanged through the coordination store
//!
//! Both documents are JSON with camelCase field names:
//! - `S/M/action`: `{memberId, action, args:{fromShard,toShard,rangeStart,rangeStop,timeoutMs,complete}}`
//! - `S/M/stat`: `{memberId, shardId, mode, status, reason}`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Cluster-wide member identifier
pub type MemberId = u32;

/// A shard member hosted on this node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: MemberId,
    pub shard_id: String,
}

impl Member {
    pub fn new(member_id: MemberId, shard_id: impl Into<String>) -> Self {
        Self {
            member_id,
            shard_id: shard_id.into(),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.member_id, self.shard_id)
    }
}

/// Migration command kinds, as written on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ActionKind {
    #[default]
    #[serde(rename = "NOOP")]
    Noop,
    #[serde(rename = "START_SLAVE")]
    StartSlave,
    #[serde(rename = "STOP_SLAVE")]
    StopSlave,
    #[serde(rename = "MIGRATE_1")]
    Migrate1,
    #[serde(rename = "MIGRATE_2")]
    Migrate2,
    #[serde(rename = "MIGRATE_3")]
    Migrate3,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Noop => "NOOP",
            ActionKind::StartSlave => "START_SLAVE",
            ActionKind::StopSlave => "STOP_SLAVE",
            ActionKind::Migrate1 => "MIGRATE_1",
            ActionKind::Migrate2 => "MIGRATE_2",
            ActionKind::Migrate3 => "MIGRATE_3",
        };
        f.write_str(name)
    }
}

/// Raw command arguments. Which fields matter depends on the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Args {
    pub from_shard: Option<String>,
    pub to_shard: Option<String>,
    pub range_start: i64,
    pub range_stop: i64,
    pub timeout_ms: u64,
    pub complete: bool,
}

/// The action document for one member. Overwritten in place by operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub member_id: MemberId,
    #[serde(default)]
    pub action: ActionKind,
    #[serde(default)]
    pub args: Args,
}

impl Action {
    /// The default document created at bootstrap
    pub fn noop(member_id: MemberId) -> Self {
        Self {
            member_id,
            action: ActionKind::Noop,
            args: Args::default(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.action == ActionKind::Noop
    }

    /// Validate the arguments for this action kind
    pub fn command(&self) -> Result<Command, ArgsError> {
        let args = &self.args;
        let timeout = Duration::from_millis(args.timeout_ms);
        let command = match self.action {
            ActionKind::Noop => Command::Noop,
            ActionKind::StartSlave => Command::StartSlave {
                from_shard: required(&args.from_shard, "fromShard")?,
                to_shard: required(&args.to_shard, "toShard")?,
                timeout,
            },
            ActionKind::StopSlave => Command::StopSlave {
                from_shard: required(&args.from_shard, "fromShard")?,
                to_shard: required(&args.to_shard, "toShard")?,
                timeout,
            },
            ActionKind::Migrate1 => Command::Migrate1 {
                range: BucketRange::closed(args.range_start, args.range_stop)?,
                from_shard: required(&args.from_shard, "fromShard")?,
                to_shard: required(&args.to_shard, "toShard")?,
                timeout,
            },
            ActionKind::Migrate2 => Command::Migrate2 {
                range: BucketRange::closed(args.range_start, args.range_stop)?,
                from_shard: required(&args.from_shard, "fromShard")?,
                to_shard: required(&args.to_shard, "toShard")?,
                complete: args.complete,
            },
            ActionKind::Migrate3 => Command::Migrate3 {
                range: BucketRange::closed(args.range_start, args.range_stop)?,
                from_shard: required(&args.from_shard, "fromShard")?,
                to_shard: required(&args.to_shard, "toShard")?,
                complete: args.complete,
            },
        };
        Ok(command)
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String, ArgsError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v.clone()),
        _ => Err(ArgsError::Missing(field)),
    }
}

/// An action document whose arguments do not fit its kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("missing argument {0}")]
    Missing(&'static str),

    #[error("invalid bucket range [{start}, {stop}]")]
    InvalidRange { start: i64, stop: i64 },
}

/// Inclusive bucket interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketRange {
    start: i64,
    stop: i64,
}

impl BucketRange {
    pub fn closed(start: i64, stop: i64) -> Result<Self, ArgsError> {
        if start > stop {
            return Err(ArgsError::InvalidRange { start, stop });
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> i64 {
        self.start
    }

    pub fn stop(&self) -> i64 {
        self.stop
    }
}

impl fmt::Display for BucketRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start, self.stop)
    }
}

/// A validated migration command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Noop,
    StartSlave {
        from_shard: String,
        to_shard: String,
        timeout: Duration,
    },
    StopSlave {
        from_shard: String,
        to_shard: String,
        timeout: Duration,
    },
    Migrate1 {
        range: BucketRange,
        from_shard: String,
        to_shard: String,
        timeout: Duration,
    },
    Migrate2 {
        range: BucketRange,
        from_shard: String,
        to_shard: String,
        complete: bool,
    },
    Migrate3 {
        range: BucketRange,
        from_shard: String,
        to_shard: String,
        complete: bool,
    },
}

impl Command {
    pub fn kind(&self) -> ActionKind {
        match self {
            Command::Noop => ActionKind::Noop,
            Command::StartSlave { .. } => ActionKind::StartSlave,
            Command::StopSlave { .. } => ActionKind::StopSlave,
            Command::Migrate1 { .. } => ActionKind::Migrate1,
            Command::Migrate2 { .. } => ActionKind::Migrate2,
            Command::Migrate3 { .. } => ActionKind::Migrate3,
        }
    }
}

/// Migration phase of a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Mode {
    #[default]
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "SLAVE")]
    Slave,
    #[serde(rename = "MIGRATING_1")]
    Migrating1,
    #[serde(rename = "MIGRATING_2")]
    Migrating2,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Normal => write!(f, "NORMAL"),
            Mode::Slave => write!(f, "SLAVE"),
            Mode::Migrating1 => write!(f, "MIGRATING_1"),
            Mode::Migrating2 => write!(f, "MIGRATING_2"),
        }
    }
}

/// Health of a member within its mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusKind {
    #[default]
    Running,
    Synced,
    Approached,
    Failed,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKind::Running => write!(f, "RUNNING"),
            StatusKind::Synced => write!(f, "SYNCED"),
            StatusKind::Approached => write!(f, "APPROACHED"),
            StatusKind::Failed => write!(f, "FAILED"),
        }
    }
}

/// The status document published for one member.
///
/// `reason` is set exactly when `status` is `FAILED`; the constructors keep
/// that invariant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub member_id: MemberId,
    pub shard_id: String,
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub status: StatusKind,
    #[serde(default)]
    pub reason: Option<String>,
}

impl Status {
    /// Bootstrap default: NORMAL / RUNNING
    pub fn new(member: &Member) -> Self {
        Self {
            member_id: member.member_id,
            shard_id: member.shard_id.clone(),
            mode: Mode::Normal,
            status: StatusKind::Running,
            reason: None,
        }
    }

    /// Successful transition into `mode`
    pub fn running(&self, mode: Mode) -> Self {
        Self {
            mode,
            status: StatusKind::Running,
            reason: None,
            ..self.clone()
        }
    }

    /// Failure in the current mode
    pub fn failed(&self, reason: impl Into<String>) -> Self {
        Self {
            status: StatusKind::Failed,
            reason: Some(reason.into()),
            ..self.clone()
        }
    }

    /// Progress refinement within the current mode
    pub fn with_progress(&self, status: StatusKind) -> Self {
        Self {
            status,
            reason: None,
            ..self.clone()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StatusKind::Failed
    }

    /// Drop a stray `reason` on a non-failed document read from the store
    pub fn normalized(mut self) -> Self {
        if self.status != StatusKind::Failed {
            self.reason = None;
        }
        self
    }
}
