//! Queue coordinator.
//!
//! [`QueueHub`] is the single entry point for queue mutations. Each operation
//! updates the [`QueueStore`] and the [`ServingTracker`] and then announces
//! the change through the [`EventBroadcaster`]. Events are emitted only after
//! the mutation has succeeded, and emission never blocks.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::broadcast::EventBroadcaster;
use crate::error::{Result, ServerError};
use crate::estimate::estimated_wait_minutes;
use crate::queue::QueueStore;
use crate::serving::{ServingRecord, ServingTracker};
use crate::types::{
    CustomerBeingServed, CustomerSummary, EntryStatus, ProviderSummary, QueueEntry, QueueEvent,
    ServiceProvider, ServiceTimeUpdated,
};

/// A queue entry annotated with its estimated wait at fetch time.
///
/// The hub knows only ids. Route handlers attach the customer or provider
/// summary from the directories before responding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    #[serde(flatten)]
    pub entry: QueueEntry,

    /// Present only for waiting entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_minutes: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<CustomerSummary>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderSummary>,
}

impl EntryView {
    /// A bare view with no estimate and no summaries.
    pub fn new(entry: QueueEntry) -> Self {
        Self {
            entry,
            estimated_wait_minutes: None,
            user: None,
            provider: None,
        }
    }
}

/// The active service at a provider with its countdown at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServingView {
    #[serde(flatten)]
    pub record: ServingRecord,
    pub remaining_minutes: f64,
    pub overtime: bool,
}

impl ServingView {
    fn at(record: ServingRecord, now: DateTime<Utc>) -> Self {
        let remaining_minutes = record.remaining_minutes_at(now);
        Self {
            overtime: remaining_minutes < 0.0,
            remaining_minutes,
            record,
        }
    }
}

/// Everything a client needs to rebuild its view of one provider's queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub provider_id: Uuid,
    pub waiting: Vec<EntryView>,
    pub serving: Option<ServingView>,
    pub service_minutes: u32,
    pub fetched_at: DateTime<Utc>,
}

/// Coordinates queue and serving state and publishes every change.
#[derive(Debug)]
pub struct QueueHub {
    store: QueueStore,
    serving: ServingTracker,
    broadcaster: EventBroadcaster,
    default_service_minutes: u32,
}

impl QueueHub {
    /// Creates a hub publishing to `broadcaster`.
    ///
    /// `default_service_minutes` is the per-head service time used both as
    /// the default allotted duration and by the wait estimator.
    pub fn new(broadcaster: EventBroadcaster, default_service_minutes: u32) -> Self {
        Self {
            store: QueueStore::new(),
            serving: ServingTracker::new(),
            broadcaster,
            default_service_minutes: default_service_minutes.max(1),
        }
    }

    pub fn broadcaster(&self) -> &EventBroadcaster {
        &self.broadcaster
    }

    pub fn default_service_minutes(&self) -> u32 {
        self.default_service_minutes
    }

    /// Adds a customer to the back of `provider`'s queue.
    ///
    /// # Errors
    ///
    /// [`ServerError::Conflict`] if the provider is closed or the customer
    /// is already waiting somewhere.
    pub async fn join(&self, customer_id: Uuid, provider: &ServiceProvider) -> Result<QueueEntry> {
        if !provider.is_open() {
            return Err(ServerError::conflict("Provider is closed"));
        }

        let entry = self.store.join(customer_id, provider.id, Utc::now()).await?;
        self.broadcaster
            .broadcast(QueueEvent::queue_updated(provider.id));
        Ok(entry)
    }

    /// Removes the customer's waiting entry at `provider_id`.
    pub async fn leave(&self, customer_id: Uuid, provider_id: Uuid) -> Result<QueueEntry> {
        let removed = self.store.leave(customer_id, provider_id).await?;
        self.broadcaster
            .broadcast(QueueEvent::queue_updated(provider_id));
        Ok(removed)
    }

    /// Moves an entry to `target` on behalf of `staff_id`.
    ///
    /// `serving` starts a service (see [`QueueHub::start_serving`]);
    /// `served` and `skipped` end the entry's life.
    ///
    /// # Errors
    ///
    /// - [`ServerError::Validation`] for the `waiting` target
    /// - [`ServerError::NotFound`] if the entry does not exist
    /// - [`ServerError::Conflict`] on an illegal transition
    pub async fn transition(
        &self,
        entry_id: Uuid,
        target: EntryStatus,
        staff_id: Uuid,
        minutes: Option<u32>,
    ) -> Result<QueueEntry> {
        match target {
            EntryStatus::Serving => self
                .start_serving(entry_id, staff_id, minutes)
                .await
                .map(|(entry, _)| entry),
            EntryStatus::Served | EntryStatus::Skipped => {
                self.close_entry(entry_id, target, staff_id).await
            }
            EntryStatus::Waiting => Err(ServerError::validation("Invalid status")),
        }
    }

    /// Starts serving an entry.
    ///
    /// The provider's serving slot is claimed first; if the entry then fails
    /// to leave the waiting sequence the claim is rolled back.
    ///
    /// # Errors
    ///
    /// [`ServerError::Conflict`] if the entry or the provider is already being
    /// served, or the entry is already terminal.
    pub async fn start_serving(
        &self,
        entry_id: Uuid,
        staff_id: Uuid,
        minutes: Option<u32>,
    ) -> Result<(QueueEntry, ServingRecord)> {
        let entry = self.store.get(entry_id).await?;
        if entry.status.is_terminal() {
            return Err(ServerError::conflict(format!(
                "Queue entry already {}",
                entry.status
            )));
        }

        let now = Utc::now();
        let allotted = minutes.unwrap_or(self.default_service_minutes);
        let record = self.serving.claim(&entry, staff_id, allotted, now).await?;

        let updated = match self
            .store
            .transition(entry_id, EntryStatus::Serving, Some(staff_id), now)
            .await
        {
            Ok((updated, _)) => updated,
            Err(e) => {
                self.serving.release(entry.provider_id, entry_id).await;
                warn!(entry_id = %entry_id, error = %e, "Start serving rolled back");
                return Err(e);
            }
        };

        info!(
            entry_id = %entry_id,
            provider_id = %updated.provider_id,
            staff_id = %staff_id,
            allotted_minutes = record.allotted_minutes,
            "Service started"
        );

        self.broadcaster
            .broadcast(QueueEvent::CustomerBeingServed(CustomerBeingServed {
                customer: updated.clone(),
                start_time: record.started_at,
                estimated_time: record.allotted_minutes,
                staff_id,
            }));
        self.broadcaster
            .broadcast(QueueEvent::queue_updated(updated.provider_id));

        Ok((updated, record))
    }

    /// Changes the allotted duration of the service in progress.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotFound`] if the entry is not being served
    /// - [`ServerError::Forbidden`] if `staff_id` did not start the service
    pub async fn adjust_duration(
        &self,
        entry_id: Uuid,
        staff_id: Uuid,
        new_minutes: u32,
    ) -> Result<ServingView> {
        let provider_id = self.store.provider_of(entry_id).await?;
        let record = self
            .serving
            .adjust(provider_id, entry_id, staff_id, new_minutes)
            .await?;
        let view = ServingView::at(record, Utc::now());

        self.broadcaster
            .broadcast(QueueEvent::ServiceTimeUpdated(ServiceTimeUpdated {
                entry_id,
                new_time: view.record.allotted_minutes,
                remaining_time: view.remaining_minutes,
                staff_id,
            }));

        Ok(view)
    }

    /// Marks the entry being served as served and frees the serving slot.
    ///
    /// # Errors
    ///
    /// [`ServerError::NotFound`] if the entry is not being served.
    pub async fn finish_serving(&self, entry_id: Uuid, staff_id: Uuid) -> Result<QueueEntry> {
        let provider_id = self.store.provider_of(entry_id).await?;
        match self.serving.current(provider_id).await {
            Some(record) if record.entry_id == entry_id => {}
            _ => return Err(ServerError::not_found("Customer is not being served")),
        }
        self.close_entry(entry_id, EntryStatus::Served, staff_id)
            .await
    }

    async fn close_entry(
        &self,
        entry_id: Uuid,
        target: EntryStatus,
        staff_id: Uuid,
    ) -> Result<QueueEntry> {
        let (updated, previous) = self
            .store
            .transition(entry_id, target, Some(staff_id), Utc::now())
            .await?;

        if previous == EntryStatus::Serving {
            self.serving.release(updated.provider_id, entry_id).await;
        }

        debug!(
            entry_id = %entry_id,
            provider_id = %updated.provider_id,
            status = %target,
            "Queue entry closed"
        );

        self.broadcaster
            .broadcast(QueueEvent::queue_updated(updated.provider_id));
        self.broadcaster
            .broadcast(QueueEvent::service_completed(entry_id));

        Ok(updated)
    }

    pub async fn get_entry(&self, entry_id: Uuid) -> Result<QueueEntry> {
        self.store.get(entry_id).await
    }

    /// Waiting entries in position order.
    pub async fn list_waiting(&self, provider_id: Uuid) -> Vec<QueueEntry> {
        self.store.list_waiting(provider_id).await
    }

    pub async fn waiting_count(&self, provider_id: Uuid) -> usize {
        self.store.waiting_count(provider_id).await
    }

    pub async fn current_serving(&self, provider_id: Uuid) -> Option<ServingRecord> {
        self.serving.current(provider_id).await
    }

    /// Snapshot of a provider's queue with remaining and estimated times
    /// computed now.
    pub async fn status(&self, provider_id: Uuid) -> QueueStatus {
        let now = Utc::now();
        let waiting = self.store.list_waiting(provider_id).await;
        let serving = self
            .serving
            .current(provider_id)
            .await
            .map(|record| ServingView::at(record, now));
        let remaining = serving.as_ref().map(|s| s.remaining_minutes);

        QueueStatus {
            provider_id,
            waiting: waiting
                .into_iter()
                .map(|entry| self.annotate(entry, remaining))
                .collect(),
            serving,
            service_minutes: self.default_service_minutes,
            fetched_at: now,
        }
    }

    /// Every entry of a customer, waiting ones annotated with an estimate.
    pub async fn customer_entries(&self, customer_id: Uuid) -> Vec<EntryView> {
        let now = Utc::now();
        let entries = self.store.list_for_customer(customer_id).await;

        let mut views = Vec::with_capacity(entries.len());
        for entry in entries {
            let remaining = if entry.is_waiting() {
                self.serving
                    .current(entry.provider_id)
                    .await
                    .map(|record| record.remaining_minutes_at(now))
            } else {
                None
            };
            views.push(self.annotate(entry, remaining));
        }
        views
    }

    fn annotate(&self, entry: QueueEntry, remaining: Option<f64>) -> EntryView {
        let estimated_wait_minutes = entry.position.map(|position| {
            estimated_wait_minutes(position, self.default_service_minutes, remaining)
        });
        EntryView {
            estimated_wait_minutes,
            ..EntryView::new(entry)
        }
    }

    /// Drops a deleted customer's waiting entry.
    pub async fn evict_customer(&self, customer_id: Uuid) {
        if let Some(provider_id) = self.store.evict_customer(customer_id).await {
            self.broadcaster
                .broadcast(QueueEvent::queue_updated(provider_id));
        }
    }

    /// Forgets everything about a deleted provider.
    pub async fn purge_provider(&self, provider_id: Uuid) {
        let removed = self.store.purge_provider(provider_id).await;
        self.serving.clear_provider(provider_id).await;
        debug!(provider_id = %provider_id, removed, "Provider queue purged");
        self.broadcaster
            .broadcast(QueueEvent::queue_updated(provider_id));
    }
}
