//! Status publication to the coordination store

use crate::common::RuntimeConfig;
use crate::coordinator::model::Status;
use crate::store::{stat_path, CoordinationStore};
use std::sync::Arc;

/// Writes status documents to `<service>/<member_id>/stat`.
///
/// Publishing is best-effort: failures are logged and reported to the
/// caller, never retried here. The next listener event or watcher tick
/// republishes from current state.
#[derive(Clone)]
pub struct StatusPublisher {
    store: Arc<dyn CoordinationStore>,
    service_name: String,
    runtime: Arc<RuntimeConfig>,
}

impl StatusPublisher {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        service_name: impl Into<String>,
        runtime: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            store,
            service_name: service_name.into(),
            runtime,
        }
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    /// Returns whether the document reached the store
    pub async fn publish(&self, status: &Status) -> bool {
        let path = stat_path(&self.service_name, status.member_id);
        let data = match serde_json::to_vec(status) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(member_id = status.member_id, "Encode stat failed: {}", e);
                return false;
            }
        };

        transition!(
            self.runtime,
            member_id = status.member_id,
            mode = %status.mode,
            status = %status.status,
            reason = status.reason.as_deref().unwrap_or(""),
            "Write stat"
        );

        let result = match self.store.set(&path, &data).await {
            // The node vanished underneath us; put it back
            Err(e) if e.is_not_found() => self.store.create(&path, &data).await,
            other => other,
        };
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    member_id = status.member_id,
                    path = %path,
                    "Write stat failed: {}",
                    e
                );
                false
            }
        }
    }
}
