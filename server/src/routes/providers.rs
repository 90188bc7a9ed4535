//! `/api/providers` - discovery for everyone, management for staff and admins.

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::info;

use super::{AppState, EntityId, MessageResponse, Payload};
use crate::auth::Caller;
use crate::error::Result;
use crate::providers::{ProviderDraft, ProviderPatch};
use crate::types::ServiceProvider;

pub(super) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_providers).post(create_provider))
        .route(
            "/{id}",
            get(get_provider)
                .put(update_provider)
                .delete(delete_provider),
        )
}

/// An open provider with its live queue length.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProviderListing {
    #[serde(flatten)]
    provider: ServiceProvider,
    queue_length: usize,
}

/// GET /api/providers - Open providers, newest first.
async fn list_providers(State(state): State<AppState>) -> Json<Vec<ProviderListing>> {
    let providers = state.providers.list_open().await;

    let mut listings = Vec::with_capacity(providers.len());
    for provider in providers {
        let queue_length = state.hub.waiting_count(provider.id).await;
        listings.push(ProviderListing {
            provider,
            queue_length,
        });
    }
    Json(listings)
}

/// GET /api/providers/{id}
async fn get_provider(
    State(state): State<AppState>,
    EntityId(id): EntityId,
) -> Result<Json<ServiceProvider>> {
    Ok(Json(state.providers.get(id).await?))
}

/// POST /api/providers - Staff or admin.
async fn create_provider(
    State(state): State<AppState>,
    caller: Caller,
    Payload(draft): Payload<ProviderDraft>,
) -> Result<(StatusCode, Json<ServiceProvider>)> {
    caller.require_queue_operator()?;

    let provider = state.providers.create(draft, None).await?;
    info!(provider_id = %provider.id, user_id = %caller.id(), "Provider created");
    Ok((StatusCode::CREATED, Json(provider)))
}

/// PUT /api/providers/{id} - Staff or admin. Partial update.
async fn update_provider(
    State(state): State<AppState>,
    caller: Caller,
    EntityId(id): EntityId,
    Payload(patch): Payload<ProviderPatch>,
) -> Result<Json<ServiceProvider>> {
    caller.require_queue_operator()?;
    Ok(Json(state.providers.update(id, patch).await?))
}

/// DELETE /api/providers/{id} - Staff or admin. Also drops the queue.
async fn delete_provider(
    State(state): State<AppState>,
    caller: Caller,
    EntityId(id): EntityId,
) -> Result<Json<MessageResponse>> {
    caller.require_queue_operator()?;

    state.providers.delete(id).await?;
    state.hub.purge_provider(id).await;
    info!(provider_id = %id, user_id = %caller.id(), "Provider deleted");
    Ok(MessageResponse::new("Deleted"))
}
