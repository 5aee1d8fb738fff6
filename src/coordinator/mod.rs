//! Migration coordinator
//!
//! The coordinator is responsible for:
//! - Bootstrapping each local member's action/stat nodes
//! - Applying operator actions through the execution delegate
//! - Polling slave sync progress
//! - Publishing member status back to the coordination store

/// Log an action/status transition: `info` when transition tracing is
/// switched on at runtime, `trace` otherwise.
macro_rules! transition {
    ($runtime:expr, $($arg:tt)+) => {
        if $runtime.trace_transitions() {
            tracing::info!($($arg)+);
        } else {
            tracing::trace!($($arg)+);
        }
    };
}

pub mod delegate;
pub mod http;
pub mod listener;
pub mod members;
pub mod model;
pub mod processor;
pub mod publish;
pub mod server;
pub mod shutdown;
pub mod watcher;

pub use delegate::{DelegateError, DryRunDelegate, ExecutionDelegate};
pub use members::{MemberProvider, MemberSnapshot, MemberStates, StaticMembers};
pub use model::{Action, ActionKind, Args, BucketRange, Command, Member, MemberId, Mode, Status, StatusKind};
pub use server::{Coordinator, CoordinatorBuilder};
pub use shutdown::ShutdownHooks;
