//! `/api/store` - the store owner's and staff's view of their own store.
//!
//! Every handler resolves the caller's store from their account; an account
//! without a live store gets `404 Store not found`.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::queue::StatusChange;
use super::{AppState, EntityId, MessageResponse, Payload};
use crate::accounts::NewUser;
use crate::auth::Caller;
use crate::error::{Result, ServerError};
use crate::hub::{EntryView, QueueStatus, ServingView};
use crate::providers::ProviderPatch;
use crate::types::{QueueEntry, Role, ServiceProvider, User};

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/my-store", get(get_my_store).put(update_my_store))
        .route("/staff", get(list_staff).post(create_staff))
        .route("/staff/{id}", delete(remove_staff))
        .route("/queue", get(store_queue))
        .route("/queue/status", post(update_status))
        .route("/serving/time", post(update_service_time))
        .route("/serving/complete", post(complete_service))
        .route("/serving-status", get(serving_status))
}

/// The caller's store, after checking the caller is a member of one.
async fn own_store(state: &AppState, caller: &Caller) -> Result<ServiceProvider> {
    let store_id = caller
        .user
        .store_id
        .ok_or_else(|| ServerError::not_found("Store not found"))?;
    state
        .providers
        .get(store_id)
        .await
        .map_err(|_| ServerError::not_found("Store not found"))
}

/// Rejects entries that belong to another provider.
async fn entry_in_store(state: &AppState, store: &ServiceProvider, entry_id: Uuid) -> Result<()> {
    let entry = state.hub.get_entry(entry_id).await?;
    if entry.provider_id != store.id {
        return Err(ServerError::forbidden(
            "Queue entry belongs to another store",
        ));
    }
    Ok(())
}

/// GET /api/store/my-store - Owner only.
async fn get_my_store(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ServiceProvider>> {
    caller.require_store_owner()?;
    Ok(Json(own_store(&state, &caller).await?))
}

/// PUT /api/store/my-store - Owner only. Partial update.
async fn update_my_store(
    State(state): State<AppState>,
    caller: Caller,
    Payload(patch): Payload<ProviderPatch>,
) -> Result<Json<ServiceProvider>> {
    caller.require_store_owner()?;
    let store = own_store(&state, &caller).await?;
    Ok(Json(state.providers.update(store.id, patch).await?))
}

/// GET /api/store/staff - Owner only.
async fn list_staff(State(state): State<AppState>, caller: Caller) -> Result<Json<Vec<User>>> {
    caller.require_store_owner()?;
    let store = own_store(&state, &caller).await?;
    Ok(Json(state.users.list_staff(store.id).await))
}

#[derive(Debug, Deserialize)]
struct StaffRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
pub(super) struct StaffCreated {
    pub message: &'static str,
    pub staff: User,
}

/// POST /api/store/staff - Owner only. The new account joins the owner's store.
async fn create_staff(
    State(state): State<AppState>,
    caller: Caller,
    Payload(body): Payload<StaffRequest>,
) -> Result<(StatusCode, Json<StaffCreated>)> {
    caller.require_store_owner()?;
    let store = own_store(&state, &caller).await?;

    let new_user =
        NewUser::new(body.name, body.email, body.password, Role::Staff).with_store(store.id);
    let staff = state.users.create(new_user).await?;
    info!(user_id = %staff.id, provider_id = %store.id, "Staff member created");

    Ok((
        StatusCode::CREATED,
        Json(StaffCreated {
            message: "Staff member created successfully",
            staff,
        }),
    ))
}

/// DELETE /api/store/staff/{id} - Owner only.
async fn remove_staff(
    State(state): State<AppState>,
    caller: Caller,
    EntityId(staff_id): EntityId,
) -> Result<Json<MessageResponse>> {
    caller.require_store_owner()?;
    let store = own_store(&state, &caller).await?;

    state.users.remove_staff(store.id, staff_id).await?;
    let revoked = state.sessions.remove_user_sessions(staff_id);
    info!(user_id = %staff_id, provider_id = %store.id, revoked, "Staff member removed");

    Ok(MessageResponse::new("Staff member removed successfully"))
}

/// GET /api/store/queue - Owner or staff.
async fn store_queue(State(state): State<AppState>, caller: Caller) -> Result<Json<QueueStatus>> {
    caller.require_store_member()?;
    let store = own_store(&state, &caller).await?;
    let mut status = state.hub.status(store.id).await;
    status.waiting = state.with_customers(status.waiting).await;
    Ok(Json(status))
}

/// POST /api/store/queue/status - Owner or staff.
///
/// `staffId` names who performs the change and defaults to the caller. It
/// must be a staff member of the same store when given.
async fn update_status(
    State(state): State<AppState>,
    caller: Caller,
    Payload(body): Payload<StatusChange>,
) -> Result<Json<EntryView>> {
    caller.require_store_member()?;
    let store = own_store(&state, &caller).await?;
    entry_in_store(&state, &store, body.entry_id).await?;

    let staff_id = match body.staff_id {
        Some(id) if id != caller.id() => {
            let member = state
                .users
                .get(id)
                .await
                .map_err(|_| ServerError::validation("Invalid staff member"))?;
            if member.role != Role::Staff || member.store_id != Some(store.id) {
                return Err(ServerError::validation("Invalid staff member"));
            }
            id
        }
        _ => caller.id(),
    };

    let entry = state
        .hub
        .transition(body.entry_id, body.status, staff_id, body.minutes)
        .await?;
    Ok(Json(state.customer_view(entry).await))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceTimeRequest {
    entry_id: Uuid,
    minutes: u32,
}

/// POST /api/store/serving/time - Owner or staff.
async fn update_service_time(
    State(state): State<AppState>,
    caller: Caller,
    Payload(body): Payload<ServiceTimeRequest>,
) -> Result<Json<ServingView>> {
    caller.require_store_member()?;
    let store = own_store(&state, &caller).await?;
    entry_in_store(&state, &store, body.entry_id).await?;

    let view = state
        .hub
        .adjust_duration(body.entry_id, caller.id(), body.minutes)
        .await?;
    Ok(Json(view))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryRef {
    entry_id: Uuid,
}

/// POST /api/store/serving/complete - Owner or staff.
async fn complete_service(
    State(state): State<AppState>,
    caller: Caller,
    Payload(body): Payload<EntryRef>,
) -> Result<Json<QueueEntry>> {
    caller.require_store_member()?;
    let store = own_store(&state, &caller).await?;
    entry_in_store(&state, &store, body.entry_id).await?;

    Ok(Json(
        state.hub.finish_serving(body.entry_id, caller.id()).await?,
    ))
}

#[derive(Debug, Serialize)]
struct ServingStatus {
    entry: Option<EntryView>,
    serving: Option<ServingView>,
}

/// GET /api/store/serving-status - Who is in the chair right now.
async fn serving_status(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ServingStatus>> {
    caller.require_store_member()?;
    let store = own_store(&state, &caller).await?;

    let serving = state.hub.status(store.id).await.serving;
    let entry = match &serving {
        Some(view) => match state.hub.get_entry(view.record.entry_id).await {
            Ok(entry) => Some(state.customer_view(entry).await),
            Err(_) => None,
        },
        None => None,
    };
    Ok(Json(ServingStatus { entry, serving }))
}
