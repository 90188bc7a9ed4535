//! `/api/queue` - customer queue operations and public queue views.

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use super::{AppState, EntityId, MessageResponse, Payload};
use crate::auth::Caller;
use crate::error::{Result, ServerError};
use crate::hub::{EntryView, QueueStatus};
use crate::types::{EntryStatus, ProviderSummary, QueueEntry};

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/join", post(join))
        .route("/leave", post(leave))
        .route("/my", get(my_entries))
        .route("/status", post(update_status))
        .route("/provider/{id}", get(provider_queue))
        .route("/provider/{id}/status", get(provider_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderRef {
    provider_id: Uuid,
}

/// POST /api/queue/join - Take the next position at an open provider.
async fn join(
    State(state): State<AppState>,
    caller: Caller,
    Payload(body): Payload<ProviderRef>,
) -> Result<Json<EntryView>> {
    let provider = state.providers.get(body.provider_id).await?;
    let entry = state.hub.join(caller.id(), &provider).await?;

    // Report the estimate the customer sees right after joining.
    let view = state
        .hub
        .customer_entries(caller.id())
        .await
        .into_iter()
        .find(|view| view.entry.id == entry.id)
        .unwrap_or_else(|| EntryView::new(entry));
    let view = EntryView {
        provider: Some(ProviderSummary::from(&provider)),
        ..view
    };
    Ok(Json(view))
}

/// POST /api/queue/leave
async fn leave(
    State(state): State<AppState>,
    caller: Caller,
    Payload(body): Payload<ProviderRef>,
) -> Result<Json<MessageResponse>> {
    state.hub.leave(caller.id(), body.provider_id).await?;
    Ok(MessageResponse::new("Left queue successfully"))
}

/// GET /api/queue/my - Every entry of the caller, any status.
async fn my_entries(State(state): State<AppState>, caller: Caller) -> Json<Vec<EntryView>> {
    let views = state.hub.customer_entries(caller.id()).await;
    Json(state.with_providers(views).await)
}

/// GET /api/queue/provider/{id} - Waiting entries in position order. Public.
async fn provider_queue(
    State(state): State<AppState>,
    EntityId(provider_id): EntityId,
) -> Json<Vec<EntryView>> {
    let waiting = state.hub.status(provider_id).await.waiting;
    Json(state.with_customers(waiting).await)
}

/// GET /api/queue/provider/{id}/status - Full snapshot for (re)connecting
/// clients. Public.
async fn provider_status(
    State(state): State<AppState>,
    EntityId(provider_id): EntityId,
) -> Result<Json<QueueStatus>> {
    state.providers.get(provider_id).await?;
    let mut status = state.hub.status(provider_id).await;
    status.waiting = state.with_customers(status.waiting).await;
    Ok(Json(status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StatusChange {
    pub entry_id: Uuid,
    pub status: EntryStatus,
    #[serde(default)]
    pub staff_id: Option<Uuid>,
    #[serde(default)]
    pub minutes: Option<u32>,
}

/// POST /api/queue/status - Staff or admin.
///
/// Staff attached to a store may only move entries of that store.
async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    Payload(body): Payload<StatusChange>,
) -> Result<Json<QueueEntry>> {
    caller.require_queue_operator()?;

    if let Some(store_id) = caller.user.store_id {
        let entry = state.hub.get_entry(body.entry_id).await?;
        if entry.provider_id != store_id {
            return Err(ServerError::forbidden(
                "Queue entry belongs to another store",
            ));
        }
    }

    let entry = state
        .hub
        .transition(body.entry_id, body.status, caller.id(), body.minutes)
        .await?;
    Ok(Json(entry))
}
