//! Shared domain types for the SmartQueue server.
//!
//! This module defines the entities that flow between the stores, the route
//! handlers and the real-time channel, plus the catalog of events pushed to
//! connected clients. Field names use `camelCase` on the wire to match the
//! JSON API contract consumed by the front end.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Roles
// ============================================================================

/// Role of an identity.
///
/// The set is closed; route guards ask the role for a capability instead of
/// comparing role names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    Staff,
    StoreOwner,
    Admin,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Staff => "staff",
            Self::StoreOwner => "store_owner",
            Self::Admin => "admin",
        }
    }

    /// Staff and admins may create, edit and delete providers and may move
    /// entries through `/queue/status`.
    pub fn can_operate_queues(self) -> bool {
        matches!(self, Self::Staff | Self::Admin)
    }

    /// Members of a store: its owner and its staff.
    pub fn is_store_member(self) -> bool {
        matches!(self, Self::Staff | Self::StoreOwner)
    }

    /// Identities allowed to push serving updates over the real-time channel.
    pub fn can_relay_serving(self) -> bool {
        matches!(self, Self::Staff | Self::StoreOwner | Self::Admin)
    }

    /// Admin accounts are protected from modification and deletion.
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }

    /// Roles an admin may assign through the role-change endpoint.
    pub fn is_assignable(self) -> bool {
        matches!(self, Self::Customer | Self::Staff)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "staff" => Ok(Self::Staff),
            "store_owner" => Ok(Self::StoreOwner),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

// ============================================================================
// Identities
// ============================================================================

/// Public view of a user account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Who holds a queue entry, as shown to the provider's operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub name: String,
    pub email: String,
}

impl From<&User> for CustomerSummary {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

// ============================================================================
// Service providers
// ============================================================================

/// Kind of business a provider runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderCategory {
    Clinic,
    Salon,
    Repair,
    Restaurant,
    Bank,
    Other,
}

/// Whether a provider accepts new queue entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    #[default]
    Open,
    Closed,
}

/// A service-offering business operating one queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceProvider {
    pub id: Uuid,
    pub name: String,
    pub category: ProviderCategory,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub status: ProviderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceProvider {
    /// Only open providers are discoverable by customers.
    pub fn is_open(&self) -> bool {
        self.status == ProviderStatus::Open
    }
}

/// Where a queue entry is held, as shown to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSummary {
    pub name: String,
    pub category: ProviderCategory,
    pub location: String,
}

impl From<&ServiceProvider> for ProviderSummary {
    fn from(provider: &ServiceProvider) -> Self {
        Self {
            name: provider.name.clone(),
            category: provider.category,
            location: provider.location.clone(),
        }
    }
}

// ============================================================================
// Queue entries
// ============================================================================

/// Lifecycle status of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Waiting,
    Serving,
    Served,
    Skipped,
}

impl EntryStatus {
    /// Served and skipped entries never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Served | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Serving => "serving",
            Self::Served => "served",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A customer's claim to a place in a provider's queue.
///
/// `position` is present only while the entry is waiting. Waiting positions
/// at one provider always form the sequence `1..=N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub provider_id: Uuid,
    pub status: EntryStatus,
    pub position: Option<u32>,
    pub joined_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub served_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staff_id: Option<Uuid>,
}

impl QueueEntry {
    pub fn is_waiting(&self) -> bool {
        self.status == EntryStatus::Waiting
    }
}

// ============================================================================
// Real-time events
// ============================================================================

/// Name of an event on the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventName {
    QueueUpdated,
    CustomerBeingServed,
    ServiceTimeUpdated,
    ServiceCompleted,
}

/// Payload of `queueUpdated`: the provider whose queue changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueUpdated {
    pub provider_id: Uuid,
}

/// Payload of `customerBeingServed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBeingServed {
    pub customer: QueueEntry,
    pub start_time: DateTime<Utc>,
    /// Allotted service duration in minutes.
    pub estimated_time: u32,
    pub staff_id: Uuid,
}

/// Payload of `serviceTimeUpdated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceTimeUpdated {
    pub entry_id: Uuid,
    /// New allotted duration in minutes.
    pub new_time: u32,
    /// Remaining minutes at the moment of the adjustment; negative in overtime.
    pub remaining_time: f64,
    pub staff_id: Uuid,
}

/// Payload of `serviceCompleted`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCompleted {
    pub entry_id: Uuid,
}

/// Server-originated event, serialized as `{"event": <name>, "data": {...}}`.
///
/// Payloads are advisory: every effect can be recovered by re-fetching the
/// queue status, so clients treat an event as a hint to refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum QueueEvent {
    QueueUpdated(QueueUpdated),
    CustomerBeingServed(CustomerBeingServed),
    ServiceTimeUpdated(ServiceTimeUpdated),
    ServiceCompleted(ServiceCompleted),
}

impl QueueEvent {
    pub fn queue_updated(provider_id: Uuid) -> Self {
        Self::QueueUpdated(QueueUpdated { provider_id })
    }

    pub fn service_completed(entry_id: Uuid) -> Self {
        Self::ServiceCompleted(ServiceCompleted { entry_id })
    }

    pub fn name(&self) -> EventName {
        match self {
            Self::QueueUpdated(_) => EventName::QueueUpdated,
            Self::CustomerBeingServed(_) => EventName::CustomerBeingServed,
            Self::ServiceTimeUpdated(_) => EventName::ServiceTimeUpdated,
            Self::ServiceCompleted(_) => EventName::ServiceCompleted,
        }
    }
}

/// Messages clients may emit over the real-time channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientEventName {
    StartServing,
    UpdateServiceTime,
    CompleteService,
}

impl ClientEventName {
    /// The event name the message is rebroadcast under.
    pub fn rebroadcast_as(self) -> EventName {
        match self {
            Self::StartServing => EventName::CustomerBeingServed,
            Self::UpdateServiceTime => EventName::ServiceTimeUpdated,
            Self::CompleteService => EventName::ServiceCompleted,
        }
    }
}

/// A message received from a client on the real-time channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientMessage {
    pub event: ClientEventName,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_capabilities() {
        assert!(Role::Staff.can_operate_queues());
        assert!(Role::Admin.can_operate_queues());
        assert!(!Role::StoreOwner.can_operate_queues());
        assert!(!Role::Customer.can_operate_queues());

        assert!(Role::Staff.is_store_member());
        assert!(Role::StoreOwner.is_store_member());
        assert!(!Role::Admin.is_store_member());

        assert!(!Role::Customer.can_relay_serving());
        assert!(Role::Admin.is_admin());
        assert!(Role::Customer.is_assignable());
        assert!(Role::Staff.is_assignable());
        assert!(!Role::StoreOwner.is_assignable());
        assert!(!Role::Admin.is_assignable());
    }

    #[test]
    fn role_round_trips_through_wire_name() {
        for role in [Role::Customer, Role::Staff, Role::StoreOwner, Role::Admin] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
            assert_eq!(
                serde_json::to_value(role).unwrap(),
                json!(role.as_str())
            );
        }
        assert!("superuser".parse::<Role>().is_err());
    }

    #[test]
    fn category_uses_capitalized_names() {
        assert_eq!(
            serde_json::to_value(ProviderCategory::Salon).unwrap(),
            json!("Salon")
        );
        assert!(serde_json::from_value::<ProviderCategory>(json!("salon")).is_err());
        assert_eq!(
            serde_json::from_value::<ProviderCategory>(json!("Bank")).unwrap(),
            ProviderCategory::Bank
        );
    }

    #[test]
    fn entry_status_terminality() {
        assert!(!EntryStatus::Waiting.is_terminal());
        assert!(!EntryStatus::Serving.is_terminal());
        assert!(EntryStatus::Served.is_terminal());
        assert!(EntryStatus::Skipped.is_terminal());
    }

    #[test]
    fn queue_event_serializes_as_named_frame() {
        let provider_id = Uuid::new_v4();
        let value = serde_json::to_value(QueueEvent::queue_updated(provider_id)).unwrap();
        assert_eq!(
            value,
            json!({ "event": "queueUpdated", "data": { "providerId": provider_id } })
        );
    }

    #[test]
    fn service_time_updated_uses_camel_case_fields() {
        let entry_id = Uuid::new_v4();
        let staff_id = Uuid::new_v4();
        let event = QueueEvent::ServiceTimeUpdated(ServiceTimeUpdated {
            entry_id,
            new_time: 15,
            remaining_time: -2.0,
            staff_id,
        });

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "serviceTimeUpdated");
        assert_eq!(value["data"]["newTime"], 15);
        assert_eq!(value["data"]["remainingTime"], -2.0);
        assert_eq!(event.name(), EventName::ServiceTimeUpdated);
    }

    #[test]
    fn client_message_maps_to_rebroadcast_name() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "event": "updateServiceTime",
            "data": { "entryId": "abc", "newTime": 12 }
        }))
        .unwrap();

        assert_eq!(msg.event, ClientEventName::UpdateServiceTime);
        assert_eq!(msg.event.rebroadcast_as(), EventName::ServiceTimeUpdated);
        assert_eq!(msg.data["newTime"], 12);
    }

    #[test]
    fn client_message_rejects_unknown_event() {
        let result = serde_json::from_value::<ClientMessage>(json!({
            "event": "queueUpdated",
            "data": {}
        }));
        assert!(result.is_err());
    }
}
