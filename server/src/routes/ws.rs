//! `GET /ws` - real-time event stream.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::AppState;
use crate::auth::authenticate;
use crate::broadcast::EventBroadcaster;
use crate::error::Result;
use crate::types::{ClientMessage, Role};

/// Query parameters for WebSocket subscription.
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    /// Session token. Optional for read-only subscribers.
    pub token: Option<String>,
}

/// GET /ws - WebSocket subscription endpoint.
///
/// Every connection receives every queue event. A connection opened with a
/// staff, store owner or admin token may also emit `startServing`,
/// `updateServiceTime` and `completeService`, which are rebroadcast to all
/// other connections.
///
/// # Responses
///
/// - `101 Switching Protocols` - WebSocket upgrade successful
/// - `401 Unauthorized` - A token was given but is not valid
pub(super) async fn get_ws(
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let role = match params.token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => Some(
            authenticate(&state.sessions, &state.users, token)
                .await?
                .role,
        ),
        None => None,
    };

    let connection_id = Uuid::new_v4();
    info!(
        connection_id = %connection_id,
        role = role.map(Role::as_str).unwrap_or("anonymous"),
        "WebSocket client connecting"
    );

    let broadcaster = state.broadcaster().clone();
    Ok(ws.on_upgrade(move |socket| handle_websocket(socket, broadcaster, connection_id, role)))
}

/// Handles an established WebSocket connection.
///
/// Forwards broadcast dispatches to the client and relays permitted client
/// messages back onto the channel.
async fn handle_websocket(
    socket: WebSocket,
    broadcaster: EventBroadcaster,
    connection_id: Uuid,
    role: Option<Role>,
) {
    let (mut sender, mut receiver) = socket.split();
    let mut event_rx = broadcaster.subscribe();

    info!(connection_id = %connection_id, "WebSocket client connected");

    let forward_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(dispatch) => {
                    if !dispatch.is_for(connection_id) {
                        continue;
                    }

                    match serde_json::to_string(&dispatch.message) {
                        Ok(json) => {
                            trace!(
                                event = ?dispatch.message.name(),
                                "Sending event to WebSocket client"
                            );
                            if let Err(err) = sender.send(Message::Text(json.into())).await {
                                debug!(error = %err, "Failed to send event to WebSocket client");
                                break;
                            }
                        }
                        Err(err) => {
                            error!(error = %err, "Failed to serialize event");
                        }
                    }
                }
                Err(RecvError::Lagged(count)) => {
                    warn!(skipped = count, "WebSocket client lagged, skipped events");
                }
                Err(RecvError::Closed) => {
                    debug!("Event broadcaster closed");
                    break;
                }
            }
        }
    });

    let can_relay = role.is_some_and(Role::can_relay_serving);

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let message: ClientMessage = match serde_json::from_str(text.as_str()) {
                    Ok(message) => message,
                    Err(err) => {
                        debug!(error = %err, "Ignoring malformed client message");
                        continue;
                    }
                };

                if !can_relay {
                    warn!(
                        connection_id = %connection_id,
                        event = ?message.event,
                        "Relay attempt without operator role ignored"
                    );
                    continue;
                }

                let event = message.event.rebroadcast_as();
                let delivered = broadcaster.relay(connection_id, event, message.data);
                trace!(event = ?event, delivered, "Relayed client message");
            }
            Ok(Message::Close(_)) => {
                debug!("WebSocket client sent close frame");
                break;
            }
            Ok(_) => {}
            Err(err) => {
                debug!(error = %err, "WebSocket error");
                break;
            }
        }
    }

    forward_task.abort();
    info!(connection_id = %connection_id, "WebSocket client disconnected");
}
