//! Privacy tests for credentials in logs.
//!
//! Neither session tokens nor passwords may appear in log output, even at
//! TRACE level.
//!
//! # Test Approach
//!
//! 1. Use a custom tracing subscriber Layer to capture all log messages
//! 2. Exercise the session store, the user directory and the HTTP login flow
//! 3. Verify that the secrets do NOT appear in captured logs

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;
use uuid::Uuid;

use smartqueue_server::accounts::{NewUser, UserDirectory};
use smartqueue_server::config::{AdminSeed, Config};
use smartqueue_server::routes::{create_router, AppState};
use smartqueue_server::session::{SessionStore, SessionStoreConfig};
use smartqueue_server::types::Role;

// ============================================================================
// Log Capture Infrastructure
// ============================================================================

#[derive(Clone, Default)]
struct LogCapture {
    logs: Arc<Mutex<Vec<String>>>,
}

impl LogCapture {
    fn get_logs(&self) -> String {
        self.logs.lock().unwrap().join("\n")
    }
}

/// A tracing Layer that records every event with all of its fields.
struct CaptureLayer {
    capture: LogCapture,
}

impl<S> Layer<S> for CaptureLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = StringVisitor::default();
        event.record(&mut visitor);

        let message = format!(
            "[{}] {}: {}",
            event.metadata().level(),
            event.metadata().target(),
            visitor.parts.join(" ")
        );
        self.capture.logs.lock().unwrap().push(message);
    }
}

#[derive(Default)]
struct StringVisitor {
    parts: Vec<String>,
}

impl tracing::field::Visit for StringVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.parts.push(format!("{}={:?}", field.name(), value));
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.parts.push(format!("{}={}", field.name(), value));
    }
}

fn capturing_subscriber() -> (impl Subscriber + Send + Sync, LogCapture) {
    let capture = LogCapture::default();
    let layer = CaptureLayer {
        capture: capture.clone(),
    };
    let subscriber = tracing_subscriber::registry()
        .with(layer.with_filter(tracing_subscriber::filter::LevelFilter::TRACE));
    (subscriber, capture)
}

/// Runs `test_fn` with log capture at TRACE level and returns the logs.
fn with_log_capture<F>(test_fn: F) -> String
where
    F: FnOnce(),
{
    let (subscriber, capture) = capturing_subscriber();
    tracing::subscriber::with_default(subscriber, test_fn);
    capture.get_logs()
}

/// Async version of [`with_log_capture`].
///
/// Only valid on the current-thread runtime, where every task polled by the
/// test runs on the thread holding the default subscriber.
async fn with_log_capture_async<F, Fut>(test_fn: F) -> String
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let (subscriber, capture) = capturing_subscriber();
    let _guard = tracing::subscriber::set_default(subscriber);
    test_fn().await;
    capture.get_logs()
}

fn assert_not_in_logs(logs: &str, secret: &str, what: &str, context: &str) {
    assert!(
        !logs.contains(secret),
        "{what} found in logs during {context}!\nValue: {secret}\nLogs:\n{logs}"
    );
}

// ============================================================================
// Session store
// ============================================================================

#[test]
fn session_token_not_logged_on_lifecycle() {
    let store = SessionStore::new(SessionStoreConfig::default());
    let user_id = Uuid::new_v4();
    let mut token = String::new();

    let logs = with_log_capture(|| {
        token = store.create_session(user_id).unwrap();
        assert!(store.validate_session(&token).is_some());
        assert!(store.validate_session(&"x".repeat(43)).is_none());
        assert!(store.remove_session(&token).is_some());
    });

    assert!(!logs.is_empty(), "session store should log something");
    assert_not_in_logs(&logs, &token, "Session token", "session lifecycle");
}

#[test]
fn session_token_not_logged_on_expiry() {
    let store = SessionStore::new(SessionStoreConfig::new(100, Duration::from_millis(5)));
    let token = store.create_session(Uuid::new_v4()).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let logs = with_log_capture(|| {
        assert_eq!(store.cleanup_expired(), 1);
        assert!(store.validate_session(&token).is_none());
    });

    assert_not_in_logs(&logs, &token, "Session token", "expiry cleanup");
}

// ============================================================================
// Accounts and login
// ============================================================================

#[tokio::test]
async fn password_not_logged_on_account_creation_or_login() {
    let password = "pw-do-not-log-4711";
    let users = UserDirectory::new();

    let logs = with_log_capture_async(|| async {
        let user = users
            .create(NewUser::new("Nina", "nina@example.com", password, Role::Customer))
            .await
            .unwrap();
        users
            .authenticate("nina@example.com", password)
            .await
            .unwrap();
        assert!(users.authenticate("nina@example.com", "wrong").await.is_err());
        assert_eq!(user.role, Role::Customer);
    })
    .await;

    assert_not_in_logs(&logs, password, "Password", "account creation and login");
    assert_not_in_logs(&logs, "$argon2", "Password hash", "account creation and login");
}

#[tokio::test]
async fn credentials_not_logged_through_http_flow() {
    let admin_password = "admin-secret-9000";
    let config = Config {
        admin_seed: Some(AdminSeed {
            name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
            password: admin_password.to_string(),
        }),
        ..Config::default()
    };
    let state = AppState::new(config);
    let app = create_router(state.clone());
    let mut token = String::new();

    let logs = with_log_capture_async(|| async {
        state.seed_admin().await.unwrap();

        let login = json!({ "email": "admin@example.com", "password": admin_password });
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header("Content-Type", "application/json")
                    .body(Body::from(login.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        token = body["token"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/logout")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    })
    .await;

    assert!(logs.contains("User logged in"), "login should be logged");
    assert_not_in_logs(&logs, admin_password, "Password", "HTTP login");
    assert_not_in_logs(&logs, &token, "Session token", "HTTP login and logout");
}
