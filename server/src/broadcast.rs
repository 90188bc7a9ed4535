//! Event broadcasting infrastructure for the SmartQueue server.
//!
//! Every state change in the queue subsystem is pushed to **all** connected
//! WebSocket sessions through a single tokio broadcast channel. There is no
//! server-side filtering: clients pick out the events for their own provider
//! or entry.
//!
//! Delivery is fire-and-forget. There are no acknowledgements and no replay:
//! a subscriber that lags behind the channel capacity, or reconnects, simply
//! misses events and must re-fetch state over REST.
//!
//! # Example
//!
//! ```rust
//! use smartqueue_server::broadcast::{Dispatch, EventBroadcaster, Outbound};
//! use smartqueue_server::types::QueueEvent;
//! use uuid::Uuid;
//!
//! let broadcaster = EventBroadcaster::new();
//! let mut rx = broadcaster.subscribe();
//!
//! let provider_id = Uuid::new_v4();
//! broadcaster.broadcast(QueueEvent::queue_updated(provider_id));
//!
//! let dispatch = rx.try_recv().unwrap();
//! assert!(dispatch.origin.is_none());
//! assert!(matches!(dispatch.message, Outbound::Event(QueueEvent::QueueUpdated(_))));
//! ```

use serde::Serialize;
use tokio::sync::broadcast::{self, Receiver, Sender};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::types::{EventName, QueueEvent};

/// Default channel capacity.
///
/// Subscribers that fall further behind than this receive
/// `RecvError::Lagged` and skip the missed events.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// A message as written to the wire: `{"event": <name>, "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    /// Event produced by a server-side state change.
    Event(QueueEvent),

    /// Message emitted by a client and rebroadcast verbatim.
    Relayed {
        event: EventName,
        data: serde_json::Value,
    },
}

impl Outbound {
    pub fn name(&self) -> EventName {
        match self {
            Self::Event(event) => event.name(),
            Self::Relayed { event, .. } => *event,
        }
    }
}

/// One item on the broadcast channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Connection that emitted a relayed message. The originating connection
    /// does not get its own message back.
    pub origin: Option<Uuid>,

    pub message: Outbound,
}

impl Dispatch {
    /// Returns `true` if this dispatch should be delivered to `connection_id`.
    pub fn is_for(&self, connection_id: Uuid) -> bool {
        self.origin != Some(connection_id)
    }
}

/// Central hub that fans events out to every subscriber.
///
/// `EventBroadcaster` is `Clone`; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: Sender<Dispatch>,
}

impl EventBroadcaster {
    /// Creates a broadcaster with [`DEFAULT_CHANNEL_CAPACITY`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broadcaster with the specified channel capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        debug!(capacity, "Created event broadcaster");
        Self { sender }
    }

    /// Subscribes to all events broadcast from now on.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Dispatch> {
        let rx = self.sender.subscribe();
        debug!(
            subscriber_count = self.subscriber_count(),
            "New subscriber added"
        );
        rx
    }

    /// Broadcasts a server-originated event to all subscribers.
    ///
    /// Returns the number of subscribers that will see the event. Never
    /// blocks; with no subscribers the event is dropped.
    pub fn broadcast(&self, event: QueueEvent) -> usize {
        trace!(event = ?event.name(), "Broadcasting event");
        self.send(Dispatch {
            origin: None,
            message: Outbound::Event(event),
        })
    }

    /// Rebroadcasts a client message to every subscriber except `origin`.
    pub fn relay(&self, origin: Uuid, event: EventName, data: serde_json::Value) -> usize {
        trace!(connection_id = %origin, event = ?event, "Relaying client message");
        self.send(Dispatch {
            origin: Some(origin),
            message: Outbound::Relayed { event, data },
        })
    }

    fn send(&self, dispatch: Dispatch) -> usize {
        match self.sender.send(dispatch) {
            Ok(receivers) => {
                trace!(receivers, "Event broadcast successful");
                receivers
            }
            Err(_) => {
                // Nobody is connected; there is nothing to deliver.
                trace!("No active subscribers to receive event");
                0
            }
        }
    }

    /// Returns the current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    #[test]
    fn broadcaster_starts_without_subscribers() {
        assert_eq!(EventBroadcaster::new().subscriber_count(), 0);
        assert_eq!(EventBroadcaster::with_capacity(16).subscriber_count(), 0);
        assert_eq!(EventBroadcaster::default().subscriber_count(), 0);
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let broadcaster = EventBroadcaster::new();

        let rx1 = broadcaster.subscribe();
        let rx2 = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);

        drop(rx1);
        assert_eq!(broadcaster.subscriber_count(), 1);

        drop(rx2);
        assert_eq!(broadcaster.subscriber_count(), 0);
    }

    #[test]
    fn broadcast_without_subscribers_returns_zero() {
        let broadcaster = EventBroadcaster::new();
        let receivers = broadcaster.broadcast(QueueEvent::queue_updated(Uuid::new_v4()));
        assert_eq!(receivers, 0);
    }

    #[test]
    fn broadcast_reaches_every_subscriber() {
        let broadcaster = EventBroadcaster::new();
        let mut rx1 = broadcaster.subscribe();
        let mut rx2 = broadcaster.subscribe();

        let entry_id = Uuid::new_v4();
        let receivers = broadcaster.broadcast(QueueEvent::service_completed(entry_id));
        assert_eq!(receivers, 2);

        for rx in [&mut rx1, &mut rx2] {
            let dispatch = rx.try_recv().unwrap();
            assert_eq!(
                dispatch.message,
                Outbound::Event(QueueEvent::service_completed(entry_id))
            );
        }
    }

    #[test]
    fn subscribers_only_see_events_after_subscribing() {
        let broadcaster = EventBroadcaster::new();
        let _keepalive = broadcaster.subscribe();
        broadcaster.broadcast(QueueEvent::queue_updated(Uuid::new_v4()));

        let mut late = broadcaster.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn relayed_dispatch_skips_its_origin() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();

        let origin = Uuid::new_v4();
        broadcaster.relay(origin, EventName::CustomerBeingServed, json!({"x": 1}));

        let dispatch = rx.try_recv().unwrap();
        assert!(!dispatch.is_for(origin));
        assert!(dispatch.is_for(Uuid::new_v4()));
        assert_eq!(dispatch.message.name(), EventName::CustomerBeingServed);
    }

    #[test]
    fn server_events_are_for_everyone() {
        let dispatch = Dispatch {
            origin: None,
            message: Outbound::Event(QueueEvent::queue_updated(Uuid::new_v4())),
        };
        assert!(dispatch.is_for(Uuid::new_v4()));
    }

    #[test]
    fn relayed_message_serializes_like_server_event() {
        let data = json!({ "entryId": "e-1", "newTime": 12 });
        let outbound = Outbound::Relayed {
            event: EventName::ServiceTimeUpdated,
            data: data.clone(),
        };

        assert_eq!(
            serde_json::to_value(&outbound).unwrap(),
            json!({ "event": "serviceTimeUpdated", "data": data })
        );
    }

    #[tokio::test]
    async fn slow_subscriber_observes_lag() {
        let broadcaster = EventBroadcaster::with_capacity(2);
        let mut rx = broadcaster.subscribe();

        for _ in 0..5 {
            broadcaster.broadcast(QueueEvent::queue_updated(Uuid::new_v4()));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(_))));
        // After the lag notice the receiver resumes with the retained events.
        assert!(rx.recv().await.is_ok());
    }
}
