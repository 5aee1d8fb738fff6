//! Execution delegate: the component that actually moves buckets and
//! manages slave replication. The coordinator only drives it.

use crate::coordinator::model::BucketRange;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A command the delegate refused or could not finish.
///
/// The display text becomes the member's published `reason`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegateError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Rejected(String),

    #[error("shard unavailable: {0}")]
    Unavailable(String),
}

/// Operations the coordinator needs from the migration engine.
///
/// Calls may block for up to their timeout. For the two `wait_*` queries a
/// zero timeout is a non-blocking check.
#[async_trait]
pub trait ExecutionDelegate: Send + Sync {
    async fn start_observing(
        &self,
        from_shard: &str,
        to_shard: &str,
        timeout: Duration,
    ) -> Result<(), DelegateError>;

    async fn stop_observing(
        &self,
        from_shard: &str,
        to_shard: &str,
        timeout: Duration,
    ) -> Result<(), DelegateError>;

    async fn migrate_buckets(
        &self,
        range: BucketRange,
        from_shard: &str,
        to_shard: &str,
        timeout: Duration,
    ) -> Result<(), DelegateError>;

    async fn set_buckets(
        &self,
        range: BucketRange,
        from_shard: &str,
        to_shard: &str,
        complete: bool,
    ) -> Result<(), DelegateError>;

    async fn wait_slaves_synced(&self, shard: &str, timeout: Duration)
        -> Result<bool, DelegateError>;

    async fn wait_slaves_approaching(
        &self,
        shard: &str,
        timeout: Duration,
    ) -> Result<bool, DelegateError>;
}

/// Delegate that logs every call and reports success.
///
/// Lets the coordinator run end to end when no migration engine is wired in.
#[derive(Debug, Default, Clone)]
pub struct DryRunDelegate;

#[async_trait]
impl ExecutionDelegate for DryRunDelegate {
    async fn start_observing(
        &self,
        from_shard: &str,
        to_shard: &str,
        timeout: Duration,
    ) -> Result<(), DelegateError> {
        tracing::info!(from_shard, to_shard, ?timeout, "[dry-run] start observing");
        Ok(())
    }

    async fn stop_observing(
        &self,
        from_shard: &str,
        to_shard: &str,
        timeout: Duration,
    ) -> Result<(), DelegateError> {
        tracing::info!(from_shard, to_shard, ?timeout, "[dry-run] stop observing");
        Ok(())
    }

    async fn migrate_buckets(
        &self,
        range: BucketRange,
        from_shard: &str,
        to_shard: &str,
        timeout: Duration,
    ) -> Result<(), DelegateError> {
        tracing::info!(%range, from_shard, to_shard, ?timeout, "[dry-run] migrate buckets");
        Ok(())
    }

    async fn set_buckets(
        &self,
        range: BucketRange,
        from_shard: &str,
        to_shard: &str,
        complete: bool,
    ) -> Result<(), DelegateError> {
        tracing::info!(%range, from_shard, to_shard, complete, "[dry-run] set buckets");
        Ok(())
    }

    async fn wait_slaves_synced(
        &self,
        _shard: &str,
        _timeout: Duration,
    ) -> Result<bool, DelegateError> {
        Ok(true)
    }

    async fn wait_slaves_approaching(
        &self,
        _shard: &str,
        _timeout: Duration,
    ) -> Result<bool, DelegateError> {
        Ok(true)
    }
}
