//! Per-provider waiting lists with position integrity.
//!
//! The [`QueueStore`] owns every queue entry. Entries of one provider live in
//! a *lane* guarded by its own async mutex, so position assignment
//! (read-max-then-insert) and renumbering (decrement-shift) for a provider are
//! atomic with respect to each other while different providers proceed in
//! parallel.
//!
//! # Invariants
//!
//! - Waiting entries of a provider have positions exactly `1..=N`, ordered by
//!   join time among the survivors.
//! - A customer holds at most one waiting entry across all providers. This is
//!   enforced by a membership index that [`QueueStore::join`] claims before it
//!   touches the lane.
//! - Any transition out of `waiting` (leave, serving, served, skipped) closes
//!   the gap it leaves behind.
//! - A purged provider's lane stays in the map marked retired. A join that
//!   claimed its membership before the purge finds the flag under the lane
//!   lock and backs out, so no entry outlives its provider.
//!
//! # Lock Order
//!
//! `join` releases the membership index before locking a lane. Every other
//! operation locks the lane first and the membership index second. The entry
//! index may be taken while a lane is held, never the other way round. No
//! path holds two lanes at once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::types::{EntryStatus, QueueEntry};

/// Entries of a single provider, in join order.
#[derive(Debug, Default)]
struct Lane {
    entries: Vec<QueueEntry>,
    /// Set once the provider is deleted. Provider ids are never reused.
    retired: bool,
}

impl Lane {
    fn next_position(&self) -> u32 {
        self.entries
            .iter()
            .filter_map(|e| if e.is_waiting() { e.position } else { None })
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Moves every waiting entry behind `vacated` one place forward.
    fn close_gap(&mut self, vacated: u32) {
        for entry in self.entries.iter_mut().filter(|e| e.is_waiting()) {
            if let Some(position) = entry.position.as_mut() {
                if *position > vacated {
                    *position -= 1;
                }
            }
        }
    }

    fn waiting(&self) -> Vec<QueueEntry> {
        let mut waiting: Vec<QueueEntry> =
            self.entries.iter().filter(|e| e.is_waiting()).cloned().collect();
        waiting.sort_by_key(|e| e.position);
        waiting
    }

    fn waiting_index_of(&self, customer_id: Uuid) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.customer_id == customer_id && e.is_waiting())
    }

    /// Removes the waiting entry at `index` and renumbers the rest.
    fn remove_waiting(&mut self, index: usize) -> QueueEntry {
        let removed = self.entries.remove(index);
        if let Some(vacated) = removed.position {
            self.close_gap(vacated);
        }
        removed
    }
}

/// Thread-safe store of all queue entries.
#[derive(Debug, Default)]
pub struct QueueStore {
    lanes: RwLock<HashMap<Uuid, Arc<Mutex<Lane>>>>,

    /// Entry id to provider id.
    entry_index: RwLock<HashMap<Uuid, Uuid>>,

    /// Customer id to the provider where the customer is waiting.
    memberships: Mutex<HashMap<Uuid, Uuid>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lane(&self, provider_id: Uuid) -> Arc<Mutex<Lane>> {
        if let Some(lane) = self.lanes.read().await.get(&provider_id) {
            return Arc::clone(lane);
        }
        let mut lanes = self.lanes.write().await;
        Arc::clone(lanes.entry(provider_id).or_default())
    }

    async fn existing_lane(&self, provider_id: Uuid) -> Option<Arc<Mutex<Lane>>> {
        self.lanes.read().await.get(&provider_id).cloned()
    }

    async fn release_membership(&self, customer_id: Uuid, provider_id: Uuid) {
        let mut memberships = self.memberships.lock().await;
        if memberships.get(&customer_id) == Some(&provider_id) {
            memberships.remove(&customer_id);
        }
    }

    /// Adds `customer_id` to the back of `provider_id`'s queue.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Conflict`] if the customer is already waiting
    /// at this or any other provider, and [`ServerError::NotFound`] if the
    /// provider was purged. State is unchanged in both cases.
    pub async fn join(
        &self,
        customer_id: Uuid,
        provider_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<QueueEntry> {
        {
            let mut memberships = self.memberships.lock().await;
            match memberships.get(&customer_id) {
                Some(current) if *current == provider_id => {
                    return Err(ServerError::conflict("Already in queue"));
                }
                Some(_) => {
                    return Err(ServerError::conflict("You are already in another queue"));
                }
                None => {
                    memberships.insert(customer_id, provider_id);
                }
            }
        }

        let handle = self.lane(provider_id).await;
        let mut lane = handle.lock().await;
        if lane.retired {
            drop(lane);
            self.release_membership(customer_id, provider_id).await;
            return Err(ServerError::not_found("Provider not found"));
        }

        let entry = QueueEntry {
            id: Uuid::new_v4(),
            customer_id,
            provider_id,
            status: EntryStatus::Waiting,
            position: Some(lane.next_position()),
            joined_at: now,
            served_at: None,
            skipped_at: None,
            staff_id: None,
        };
        lane.entries.push(entry.clone());
        self.entry_index.write().await.insert(entry.id, provider_id);
        drop(lane);

        debug!(
            entry_id = %entry.id,
            provider_id = %provider_id,
            position = ?entry.position,
            "Customer joined queue"
        );
        Ok(entry)
    }

    /// Removes the customer's waiting entry at `provider_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::NotFound`] if the customer is not waiting there.
    pub async fn leave(&self, customer_id: Uuid, provider_id: Uuid) -> Result<QueueEntry> {
        let lane = self
            .existing_lane(provider_id)
            .await
            .ok_or_else(|| ServerError::not_found("Not in queue"))?;

        let removed = {
            let mut lane = lane.lock().await;
            let index = lane
                .waiting_index_of(customer_id)
                .ok_or_else(|| ServerError::not_found("Not in queue"))?;
            lane.remove_waiting(index)
        };

        self.entry_index.write().await.remove(&removed.id);
        self.release_membership(customer_id, provider_id).await;

        debug!(
            entry_id = %removed.id,
            provider_id = %provider_id,
            vacated = ?removed.position,
            "Customer left queue"
        );
        Ok(removed)
    }

    /// Moves an entry to `target` and returns `(updated, previous_status)`.
    ///
    /// Leaving `waiting` closes the position gap. `served` and `skipped`
    /// stamp the corresponding timestamp.
    ///
    /// # Errors
    ///
    /// - [`ServerError::NotFound`] if the entry does not exist
    /// - [`ServerError::Validation`] if `target` is `waiting`
    /// - [`ServerError::Conflict`] if the entry is already terminal or
    ///   already in `target`
    pub async fn transition(
        &self,
        entry_id: Uuid,
        target: EntryStatus,
        staff_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<(QueueEntry, EntryStatus)> {
        if target == EntryStatus::Waiting {
            return Err(ServerError::validation("Invalid status"));
        }

        let provider_id = self.provider_of(entry_id).await?;
        let lane = self
            .existing_lane(provider_id)
            .await
            .ok_or_else(|| ServerError::not_found("Queue entry not found"))?;

        let (updated, previous) = {
            let mut lane = lane.lock().await;
            let index = lane
                .entries
                .iter()
                .position(|e| e.id == entry_id)
                .ok_or_else(|| ServerError::not_found("Queue entry not found"))?;

            let previous = lane.entries[index].status;
            if previous.is_terminal() {
                return Err(ServerError::conflict(format!(
                    "Queue entry already {previous}"
                )));
            }
            if previous == target {
                return Err(ServerError::conflict(format!("Queue entry already {target}")));
            }

            let vacated = lane.entries[index].position.take();
            {
                let entry = &mut lane.entries[index];
                entry.status = target;
                match target {
                    EntryStatus::Served => entry.served_at = Some(now),
                    EntryStatus::Skipped => entry.skipped_at = Some(now),
                    EntryStatus::Serving | EntryStatus::Waiting => {}
                }
                if staff_id.is_some() {
                    entry.staff_id = staff_id;
                }
            }
            if let Some(vacated) = vacated {
                lane.close_gap(vacated);
            }
            (lane.entries[index].clone(), previous)
        };

        if previous == EntryStatus::Waiting {
            self.release_membership(updated.customer_id, provider_id)
                .await;
        }

        debug!(
            entry_id = %entry_id,
            provider_id = %provider_id,
            from = %previous,
            to = %target,
            "Queue entry transitioned"
        );
        Ok((updated, previous))
    }

    /// Provider that owns `entry_id`.
    pub async fn provider_of(&self, entry_id: Uuid) -> Result<Uuid> {
        self.entry_index
            .read()
            .await
            .get(&entry_id)
            .copied()
            .ok_or_else(|| ServerError::not_found("Queue entry not found"))
    }

    /// Looks up a single entry.
    pub async fn get(&self, entry_id: Uuid) -> Result<QueueEntry> {
        let provider_id = self.provider_of(entry_id).await?;
        let lane = self
            .existing_lane(provider_id)
            .await
            .ok_or_else(|| ServerError::not_found("Queue entry not found"))?;
        let lane = lane.lock().await;
        lane.entries
            .iter()
            .find(|e| e.id == entry_id)
            .cloned()
            .ok_or_else(|| ServerError::not_found("Queue entry not found"))
    }

    /// Waiting entries of a provider in ascending position order.
    pub async fn list_waiting(&self, provider_id: Uuid) -> Vec<QueueEntry> {
        match self.existing_lane(provider_id).await {
            Some(lane) => lane.lock().await.waiting(),
            None => Vec::new(),
        }
    }

    /// Number of waiting entries at a provider.
    pub async fn waiting_count(&self, provider_id: Uuid) -> usize {
        match self.existing_lane(provider_id).await {
            Some(lane) => lane
                .lock()
                .await
                .entries
                .iter()
                .filter(|e| e.is_waiting())
                .count(),
            None => 0,
        }
    }

    /// All entries of a customer regardless of status, oldest first.
    pub async fn list_for_customer(&self, customer_id: Uuid) -> Vec<QueueEntry> {
        let lanes: Vec<Arc<Mutex<Lane>>> = self.lanes.read().await.values().cloned().collect();

        let mut mine = Vec::new();
        for lane in lanes {
            let lane = lane.lock().await;
            mine.extend(
                lane.entries
                    .iter()
                    .filter(|e| e.customer_id == customer_id)
                    .cloned(),
            );
        }
        mine.sort_by_key(|e| e.joined_at);
        mine
    }

    /// Removes a customer's waiting entry, wherever it is.
    ///
    /// Returns the provider whose queue changed, if any.
    pub async fn evict_customer(&self, customer_id: Uuid) -> Option<Uuid> {
        let provider_id = self.memberships.lock().await.get(&customer_id).copied()?;
        match self.leave(customer_id, provider_id).await {
            Ok(_) => Some(provider_id),
            Err(_) => None,
        }
    }

    /// Empties a provider's lane and retires it so later joins fail.
    /// Returns the number of entries removed.
    pub async fn purge_provider(&self, provider_id: Uuid) -> usize {
        let lane = self.lane(provider_id).await;
        let entries = {
            let mut lane = lane.lock().await;
            lane.retired = true;
            std::mem::take(&mut lane.entries)
        };

        {
            let mut index = self.entry_index.write().await;
            for entry in &entries {
                index.remove(&entry.id);
            }
        }
        self.memberships
            .lock()
            .await
            .retain(|_, provider| *provider != provider_id);

        trace!(provider_id = %provider_id, removed = entries.len(), "Purged provider lane");
        entries.len()
    }
}
