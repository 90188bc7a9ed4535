//! Serving state: which entry each provider is handling right now.
//!
//! A [`ServingRecord`] is owned by its provider; the staff member that started
//! the service is an attribute. At most one record is active per provider and
//! the slot is claimed atomically, so among concurrent callers trying to start
//! a service exactly one wins.
//!
//! Remaining time is never stored. It is derived from `(started_at,
//! allotted_minutes)` and the instant of observation, and goes negative once
//! the allotted duration is exceeded (overtime).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::types::QueueEntry;

/// Shortest service duration that can be allotted, in minutes.
pub const MIN_ALLOTTED_MINUTES: u32 = 1;

/// Clamps a requested duration to [`MIN_ALLOTTED_MINUTES`].
pub fn clamp_minutes(minutes: u32) -> u32 {
    minutes.max(MIN_ALLOTTED_MINUTES)
}

/// The active service at one provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingRecord {
    pub provider_id: Uuid,
    pub entry_id: Uuid,
    pub customer_id: Uuid,
    pub staff_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub allotted_minutes: u32,
}

impl ServingRecord {
    /// Remaining minutes at `now`. Negative in overtime.
    pub fn remaining_minutes_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_ms = (now - self.started_at).num_milliseconds() as f64;
        f64::from(self.allotted_minutes) - elapsed_ms / 60_000.0
    }

    pub fn is_overtime_at(&self, now: DateTime<Utc>) -> bool {
        self.remaining_minutes_at(now) < 0.0
    }
}

/// Per-provider registry of active services.
#[derive(Debug, Default)]
pub struct ServingTracker {
    active: Mutex<HashMap<Uuid, ServingRecord>>,
}

impl ServingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the provider's serving slot for `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Conflict`] if the entry is already being served
    /// or the provider is already serving someone else.
    pub async fn claim(
        &self,
        entry: &QueueEntry,
        staff_id: Uuid,
        allotted_minutes: u32,
        now: DateTime<Utc>,
    ) -> Result<ServingRecord> {
        let mut active = self.active.lock().await;

        if let Some(current) = active.get(&entry.provider_id) {
            let message = if current.entry_id != entry.id {
                "Another customer is already being served"
            } else if current.staff_id != staff_id {
                "Customer is already being served by another staff member"
            } else {
                "Customer is already being served"
            };
            return Err(ServerError::conflict(message));
        }

        let record = ServingRecord {
            provider_id: entry.provider_id,
            entry_id: entry.id,
            customer_id: entry.customer_id,
            staff_id,
            started_at: now,
            allotted_minutes: clamp_minutes(allotted_minutes),
        };
        active.insert(entry.provider_id, record.clone());

        debug!(
            provider_id = %record.provider_id,
            entry_id = %record.entry_id,
            staff_id = %staff_id,
            allotted_minutes = record.allotted_minutes,
            "Serving slot claimed"
        );
        Ok(record)
    }

    /// Changes the allotted duration of an active service.
    ///
    /// Only the staff member that started the service may adjust it.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotFound`] if `entry_id` is not being served
    /// - [`ServerError::Forbidden`] if `staff_id` did not start the service
    pub async fn adjust(
        &self,
        provider_id: Uuid,
        entry_id: Uuid,
        staff_id: Uuid,
        new_minutes: u32,
    ) -> Result<ServingRecord> {
        let mut active = self.active.lock().await;
        let record = active
            .get_mut(&provider_id)
            .filter(|r| r.entry_id == entry_id)
            .ok_or_else(|| ServerError::not_found("Customer is not being served"))?;

        if record.staff_id != staff_id {
            return Err(ServerError::forbidden(
                "Only the staff member serving this customer can adjust the time",
            ));
        }

        record.allotted_minutes = clamp_minutes(new_minutes);
        debug!(
            provider_id = %provider_id,
            entry_id = %entry_id,
            allotted_minutes = record.allotted_minutes,
            "Service duration adjusted"
        );
        Ok(record.clone())
    }

    /// Clears the provider's slot if it is held by `entry_id`.
    pub async fn release(&self, provider_id: Uuid, entry_id: Uuid) -> Option<ServingRecord> {
        let mut active = self.active.lock().await;
        if active.get(&provider_id).map(|r| r.entry_id) != Some(entry_id) {
            return None;
        }
        let released = active.remove(&provider_id);
        if released.is_some() {
            debug!(provider_id = %provider_id, entry_id = %entry_id, "Serving slot released");
        }
        released
    }

    /// Clears whatever the provider is serving.
    pub async fn clear_provider(&self, provider_id: Uuid) -> Option<ServingRecord> {
        self.active.lock().await.remove(&provider_id)
    }

    /// The provider's active service, if any.
    pub async fn current(&self, provider_id: Uuid) -> Option<ServingRecord> {
        self.active.lock().await.get(&provider_id).cloned()
    }
}
