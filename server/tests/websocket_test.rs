//! Integration tests for the `/ws` real-time channel.
//!
//! These tests run the server on a random local port and connect real
//! WebSocket clients:
//! - Anonymous subscribers receive queue events
//! - Operator connections relay serving messages to everyone else
//! - Relays from customers and anonymous clients are dropped
//! - An invalid token is rejected before the upgrade

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use smartqueue_server::accounts::NewUser;
use smartqueue_server::config::Config;
use smartqueue_server::providers::ProviderDraft;
use smartqueue_server::routes::{create_router, AppState};
use smartqueue_server::types::{ProviderCategory, Role, ServiceProvider};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Test Helpers
// ============================================================================

/// Spawns the server on a random port and returns its address and state.
async fn spawn_test_server() -> (SocketAddr, AppState, tokio::task::JoinHandle<()>) {
    let state = AppState::new(Config::default());
    let app = create_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, state, handle)
}

/// Logs in a fresh account with `role` and returns its token.
async fn token_for(state: &AppState, role: Role, email: &str) -> String {
    let user = state
        .users
        .create(NewUser::new("Tester", email, "pw-123456", role))
        .await
        .unwrap();
    state.sessions.create_session(user.id).unwrap()
}

async fn provider(state: &AppState) -> ServiceProvider {
    let draft = ProviderDraft {
        name: "Acme Salon".to_string(),
        category: ProviderCategory::Salon,
        location: "Main St".to_string(),
        description: None,
        phone: None,
        status: None,
    };
    state.providers.create(draft, None).await.unwrap()
}

/// Connects a client and waits until the server has subscribed it.
async fn connect(addr: SocketAddr, state: &AppState, token: Option<&str>) -> Client {
    let before = state.broadcaster().subscriber_count();
    let url = match token {
        Some(token) => format!("ws://{addr}/ws?token={token}"),
        None => format!("ws://{addr}/ws"),
    };
    let (client, _) = tokio_test::assert_ok!(connect_async(url).await);

    timeout(Duration::from_secs(1), async {
        while state.broadcaster().subscriber_count() <= before {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("server never subscribed the connection");

    client
}

/// Next JSON text frame, or `None` if nothing arrives in time.
async fn next_json(client: &mut Client, wait: Duration) -> Option<Value> {
    let frame = timeout(wait, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return Some(text),
                Some(Ok(_)) => continue,
                _ => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()?;
    Some(serde_json::from_str(frame.as_str()).unwrap())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn anonymous_subscriber_receives_queue_updates() {
    let (addr, state, handle) = spawn_test_server().await;
    let acme = provider(&state).await;
    let mut client = connect(addr, &state, None).await;

    let customer = state
        .users
        .create(NewUser::new("C", "c@example.com", "pw-123456", Role::Customer))
        .await
        .unwrap();
    state.hub.join(customer.id, &acme).await.unwrap();

    let message = next_json(&mut client, Duration::from_secs(1))
        .await
        .expect("no event received");
    assert_eq!(message["event"], "queueUpdated");
    assert_eq!(message["data"]["providerId"], acme.id.to_string());

    handle.abort();
}

#[tokio::test]
async fn operator_messages_are_relayed_to_other_connections() {
    let (addr, state, handle) = spawn_test_server().await;
    let staff_token = token_for(&state, Role::Staff, "staff@example.com").await;

    let mut staff = connect(addr, &state, Some(&staff_token)).await;
    let mut watcher = connect(addr, &state, None).await;

    let data = json!({ "entryId": "entry-1", "estimatedTime": 15 });
    let outgoing = json!({ "event": "startServing", "data": data }).to_string();
    staff.send(Message::Text(outgoing.into())).await.unwrap();

    let relayed = next_json(&mut watcher, Duration::from_secs(1))
        .await
        .expect("relay not delivered");
    assert_eq!(relayed["event"], "customerBeingServed");
    assert_eq!(relayed["data"], data);

    // The sender does not get its own message back.
    assert!(next_json(&mut staff, Duration::from_millis(200)).await.is_none());

    handle.abort();
}

#[tokio::test]
async fn relays_from_non_operators_are_dropped() {
    let (addr, state, handle) = spawn_test_server().await;
    let customer_token = token_for(&state, Role::Customer, "cust@example.com").await;

    let mut customer = connect(addr, &state, Some(&customer_token)).await;
    let mut anonymous = connect(addr, &state, None).await;
    let mut watcher = connect(addr, &state, None).await;

    let message = json!({ "event": "completeService", "data": { "entryId": "x" } }).to_string();
    customer
        .send(Message::Text(message.clone().into()))
        .await
        .unwrap();
    anonymous.send(Message::Text(message.into())).await.unwrap();

    assert!(next_json(&mut watcher, Duration::from_millis(300)).await.is_none());

    handle.abort();
}

#[tokio::test]
async fn invalid_token_is_rejected() {
    let (addr, _state, handle) = spawn_test_server().await;

    let result = connect_async(format!("ws://{addr}/ws?token=not-a-real-token")).await;
    match result {
        Err(WsError::Http(response)) => assert_eq!(response.status(), 401),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }

    handle.abort();
}
