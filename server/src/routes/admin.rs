//! `/api/admin` - user administration. Admin only.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::store::StaffCreated;
use super::{AppState, EntityId, MessageResponse, Payload};
use crate::accounts::NewUser;
use crate::auth::Caller;
use crate::error::{Result, ServerError};
use crate::types::{Role, User};

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", delete(delete_user))
        .route("/users/{id}/role", put(update_role))
        .route("/staff", post(create_staff))
}

/// GET /api/admin/users - Every account, newest first.
async fn list_users(State(state): State<AppState>, caller: Caller) -> Result<Json<Vec<User>>> {
    caller.require_admin()?;
    Ok(Json(state.users.list().await))
}

/// DELETE /api/admin/users/{id}
///
/// Revokes the account's sessions and drops its waiting entry.
async fn delete_user(
    State(state): State<AppState>,
    caller: Caller,
    EntityId(id): EntityId,
) -> Result<Json<MessageResponse>> {
    caller.require_admin()?;

    state.users.delete(caller.id(), id).await?;
    let revoked = state.sessions.remove_user_sessions(id);
    state.hub.evict_customer(id).await;
    info!(user_id = %id, revoked, "User removed by admin");

    Ok(MessageResponse::new("User deleted successfully"))
}

#[derive(Debug, Deserialize)]
struct RoleRequest {
    #[serde(default)]
    role: String,
}

#[derive(Debug, Serialize)]
struct RoleUpdated {
    message: &'static str,
    user: User,
}

/// PUT /api/admin/users/{id}/role - Only `customer` and `staff` are accepted.
async fn update_role(
    State(state): State<AppState>,
    caller: Caller,
    EntityId(id): EntityId,
    Payload(body): Payload<RoleRequest>,
) -> Result<Json<RoleUpdated>> {
    caller.require_admin()?;

    let role: Role = body
        .role
        .parse()
        .map_err(|_| ServerError::validation("Invalid role"))?;
    let user = state.users.set_role(id, role).await?;

    Ok(Json(RoleUpdated {
        message: "User role updated successfully",
        user,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminStaffRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    store_id: Option<Uuid>,
}

/// POST /api/admin/staff - Creates a staff account, optionally bound to a
/// provider.
async fn create_staff(
    State(state): State<AppState>,
    caller: Caller,
    Payload(body): Payload<AdminStaffRequest>,
) -> Result<(StatusCode, Json<StaffCreated>)> {
    caller.require_admin()?;

    let mut new_user = NewUser::new(body.name, body.email, body.password, Role::Staff);
    if let Some(store_id) = body.store_id {
        state.providers.get(store_id).await?;
        new_user = new_user.with_store(store_id);
    }

    let staff = state.users.create(new_user).await?;
    info!(user_id = %staff.id, actor_id = %caller.id(), "Staff account created");

    Ok((
        StatusCode::CREATED,
        Json(StaffCreated {
            message: "Staff account created successfully",
            staff,
        }),
    ))
}
