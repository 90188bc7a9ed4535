//! `/api/auth` - registration, login and the current identity.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{AppState, MessageResponse, Payload};
use crate::accounts::NewUser;
use crate::auth::Caller;
use crate::error::{Result, ServerError};
use crate::providers::ProviderDraft;
use crate::types::{ProviderCategory, Role, ServiceProvider, User};

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/register-store", post(register_store))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterResponse {
    message: &'static str,
    user: User,
}

/// POST /api/auth/register - Public sign-up. Customers only.
async fn register(
    State(state): State<AppState>,
    Payload(body): Payload<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>)> {
    if let Some(role) = body.role.as_deref() {
        if role != Role::Customer.as_str() {
            warn!(requested_role = role, "Rejected self-registration with elevated role");
            return Err(ServerError::forbidden(
                "Only customer accounts can be created through registration",
            ));
        }
    }

    let user = state
        .users
        .create(NewUser::new(body.name, body.email, body.password, Role::Customer))
        .await?;
    info!(user_id = %user.id, "Customer registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Customer account created successfully",
            user,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterStoreRequest {
    #[serde(default)]
    owner_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    store_name: String,
    category: ProviderCategory,
    #[serde(default)]
    location: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    phone: Option<String>,
}

#[derive(Debug, Serialize)]
struct RegisterStoreResponse {
    message: &'static str,
    user: User,
    store: ServiceProvider,
}

/// POST /api/auth/register-store - Public sign-up of an owner and its store.
async fn register_store(
    State(state): State<AppState>,
    Payload(body): Payload<RegisterStoreRequest>,
) -> Result<(StatusCode, Json<RegisterStoreResponse>)> {
    let draft = ProviderDraft {
        name: body.store_name,
        category: body.category,
        location: body.location,
        description: body.description,
        phone: body.phone,
        status: None,
    };
    draft.validate()?;

    let new_owner = NewUser::new(body.owner_name, body.email, body.password, Role::StoreOwner);
    let (owner, store) = open_store(&state, new_owner, draft).await?;

    info!(user_id = %owner.id, provider_id = %store.id, "Store registered");

    Ok((
        StatusCode::CREATED,
        Json(RegisterStoreResponse {
            message: "Store registered successfully",
            user: owner,
            store,
        }),
    ))
}

/// Creates the owner account and its store as one step.
///
/// If the store cannot be created the owner account is discarded again, so
/// the email stays free for a retry.
async fn open_store(
    state: &AppState,
    new_owner: NewUser,
    draft: ProviderDraft,
) -> Result<(User, ServiceProvider)> {
    let owner = state.users.create(new_owner).await?;

    let store = match state.providers.create(draft, Some(owner.id)).await {
        Ok(store) => store,
        Err(err) => {
            state.users.discard(owner.id).await;
            warn!(user_id = %owner.id, error = %err, "Store creation failed, owner discarded");
            return Err(err);
        }
    };

    match state.users.assign_store(owner.id, store.id).await {
        Ok(owner) => Ok((owner, store)),
        Err(err) => {
            // The store is unreachable without its owner.
            let _ = state.providers.delete(store.id).await;
            state.users.discard(owner.id).await;
            Err(err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    token: String,
    user: User,
}

/// POST /api/auth/login - Exchange credentials for a bearer token.
async fn login(
    State(state): State<AppState>,
    Payload(body): Payload<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let user = state.users.authenticate(&body.email, &body.password).await?;
    let token = state
        .sessions
        .create_session(user.id)
        .map_err(|e| ServerError::internal(e.to_string()))?;

    info!(user_id = %user.id, role = %user.role, "User logged in");
    Ok(Json(LoginResponse { token, user }))
}

/// POST /api/auth/logout - Revoke the presented token.
async fn logout(State(state): State<AppState>, caller: Caller) -> Json<MessageResponse> {
    state.sessions.remove_session(caller.token());
    info!(user_id = %caller.id(), "User logged out");
    MessageResponse::new("Logged out successfully")
}

/// GET /api/auth/me - The authenticated account.
async fn me(caller: Caller) -> Json<User> {
    Json(caller.user)
}
