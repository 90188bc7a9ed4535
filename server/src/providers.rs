//! In-process directory of service providers.

use std::collections::HashMap;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::types::{ProviderCategory, ProviderStatus, ProviderSummary, ServiceProvider};

/// Fields for a new provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDraft {
    pub name: String,
    pub category: ProviderCategory,
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<ProviderStatus>,
}

impl ProviderDraft {
    /// Rejects blank names and locations.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() || self.location.trim().is_empty() {
            return Err(ServerError::validation(
                "All required fields must be provided",
            ));
        }
        Ok(())
    }
}

/// Partial update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderPatch {
    pub name: Option<String>,
    pub category: Option<ProviderCategory>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub phone: Option<String>,
    pub status: Option<ProviderStatus>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Thread-safe provider directory.
#[derive(Debug, Default)]
pub struct ProviderDirectory {
    providers: RwLock<HashMap<Uuid, ServiceProvider>>,
}

impl ProviderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(
        &self,
        draft: ProviderDraft,
        owner_id: Option<Uuid>,
    ) -> Result<ServiceProvider> {
        draft.validate()?;

        let now = Utc::now();
        let provider = ServiceProvider {
            id: Uuid::new_v4(),
            name: draft.name.trim().to_string(),
            category: draft.category,
            location: draft.location.trim().to_string(),
            description: non_blank(draft.description),
            phone: non_blank(draft.phone),
            status: draft.status.unwrap_or_default(),
            owner_id,
            created_at: now,
            updated_at: now,
        };

        self.providers
            .write()
            .await
            .insert(provider.id, provider.clone());
        debug!(provider_id = %provider.id, name = %provider.name, "Provider created");
        Ok(provider)
    }

    pub async fn get(&self, id: Uuid) -> Result<ServiceProvider> {
        self.providers
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ServerError::not_found("Provider not found"))
    }

    /// Open providers, newest first.
    pub async fn list_open(&self) -> Vec<ServiceProvider> {
        let mut open: Vec<ServiceProvider> = self
            .providers
            .read()
            .await
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        open
    }

    /// Summaries of the providers among `ids` that still exist.
    pub async fn summaries(
        &self,
        ids: impl IntoIterator<Item = Uuid>,
    ) -> HashMap<Uuid, ProviderSummary> {
        let providers = self.providers.read().await;
        ids.into_iter()
            .filter_map(|id| providers.get(&id).map(|p| (id, ProviderSummary::from(p))))
            .collect()
    }

    /// Applies a partial update.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotFound`] if the provider does not exist
    /// - [`ServerError::Validation`] if the update blanks the name or location
    pub async fn update(&self, id: Uuid, patch: ProviderPatch) -> Result<ServiceProvider> {
        let mut providers = self.providers.write().await;
        let provider = providers
            .get_mut(&id)
            .ok_or_else(|| ServerError::not_found("Provider not found"))?;

        let blank = |v: &Option<String>| v.as_deref().is_some_and(|s| s.trim().is_empty());
        if blank(&patch.name) || blank(&patch.location) {
            return Err(ServerError::validation("Name and location cannot be empty"));
        }

        if let Some(name) = patch.name {
            provider.name = name.trim().to_string();
        }
        if let Some(category) = patch.category {
            provider.category = category;
        }
        if let Some(location) = patch.location {
            provider.location = location.trim().to_string();
        }
        if patch.description.is_some() {
            provider.description = non_blank(patch.description);
        }
        if patch.phone.is_some() {
            provider.phone = non_blank(patch.phone);
        }
        if let Some(status) = patch.status {
            provider.status = status;
        }
        provider.updated_at = Utc::now();

        debug!(provider_id = %id, "Provider updated");
        Ok(provider.clone())
    }

    pub async fn delete(&self, id: Uuid) -> Result<ServiceProvider> {
        let removed = self
            .providers
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| ServerError::not_found("Provider not found"))?;
        debug!(provider_id = %id, "Provider deleted");
        Ok(removed)
    }
}
