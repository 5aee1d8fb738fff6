//! Read-only admin HTTP API
//!
//! Exposes the coordinator's view of its local members. Commands are never
//! accepted here; they only arrive through the coordination store.

use crate::common::Error;
use crate::coordinator::members::{MemberSnapshot, MemberStates};
use crate::coordinator::model::{MemberId, StatusKind};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AdminState {
    pub service_name: String,
    pub members: Arc<MemberStates>,
}

pub fn create_router(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/members", get(list_members))
        .route("/admin/members/:member_id", get(get_member))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` flips to true
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AdminState,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> crate::Result<()> {
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;
    Ok(())
}

struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.to_http_status();
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health(State(state): State<AdminState>) -> impl IntoResponse {
    let snapshots = state.members.snapshots();
    let failed = snapshots
        .iter()
        .filter(|s| s.status.status == StatusKind::Failed)
        .count();
    let unpublished = snapshots.iter().filter(|s| !s.published).count();

    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "service": state.service_name,
            "members": snapshots.len(),
            "failed": failed,
            "unpublished": unpublished,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

async fn list_members(State(state): State<AdminState>) -> Json<Vec<MemberSnapshot>> {
    Json(state.members.snapshots())
}

async fn get_member(
    State(state): State<AdminState>,
    Path(member_id): Path<MemberId>,
) -> Result<Json<MemberSnapshot>, ApiError> {
    state
        .members
        .get(member_id)
        .map(|slot| Json(slot.snapshot()))
        .ok_or(ApiError(Error::UnknownMember(member_id)))
}
