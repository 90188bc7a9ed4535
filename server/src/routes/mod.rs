//! HTTP route handlers for the SmartQueue server.
//!
//! This module provides the HTTP API endpoints. REST routes live under
//! `/api`:
//!
//! - `/api/auth/*` - Registration, login, logout and the current identity
//! - `/api/providers/*` - Provider discovery and management
//! - `/api/queue/*` - Joining, leaving and inspecting queues
//! - `/api/store/*` - Store owner and staff operations
//! - `/api/admin/*` - User administration
//!
//! Plus:
//!
//! - `GET /ws` - WebSocket subscription endpoint for real-time events
//! - `GET /health` - Health check endpoint
//!
//! # Architecture
//!
//! All routes share application state through [`AppState`], which contains:
//! - Configuration
//! - The user and provider directories
//! - The session store backing bearer authentication
//! - The queue hub, which owns queue and serving state and the broadcaster
//! - Server start time for uptime reporting
//!
//! # Example
//!
//! ```rust,no_run
//! use smartqueue_server::routes::{create_router, AppState};
//! use smartqueue_server::config::Config;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("failed to load config");
//!     let state = AppState::new(config);
//!     let app = create_router(state);
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3001").await.unwrap();
//!     axum::serve(listener, app).await.unwrap();
//! }
//! ```

mod admin;
mod auth;
mod providers;
mod queue;
mod store;
mod ws;

use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        request::Parts,
        HeaderValue, Method,
    },
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::accounts::UserDirectory;
use crate::broadcast::EventBroadcaster;
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::hub::{EntryView, QueueHub};
use crate::providers::ProviderDirectory;
use crate::session::{SessionStore, SessionStoreConfig};
use crate::types::{CustomerSummary, QueueEntry, User};

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all route handlers.
///
/// Cloning is cheap: every component sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,

    /// User accounts.
    pub users: Arc<UserDirectory>,

    /// Service providers.
    pub providers: Arc<ProviderDirectory>,

    /// Login sessions.
    pub sessions: Arc<SessionStore>,

    /// Queue and serving state plus the event broadcaster.
    pub hub: Arc<QueueHub>,

    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    /// Creates a new application state with the given configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_broadcaster(config, EventBroadcaster::new())
    }

    /// Creates application state publishing through `broadcaster`.
    ///
    /// Useful for testing or when a custom channel capacity is needed.
    #[must_use]
    pub fn with_broadcaster(config: Config, broadcaster: EventBroadcaster) -> Self {
        let sessions = SessionStore::new(SessionStoreConfig {
            default_ttl: config.session_ttl,
            ..SessionStoreConfig::default()
        });
        let hub = QueueHub::new(broadcaster, config.default_service_minutes);

        Self {
            config: Arc::new(config),
            users: Arc::new(UserDirectory::new()),
            providers: Arc::new(ProviderDirectory::new()),
            sessions: Arc::new(sessions),
            hub: Arc::new(hub),
            start_time: Instant::now(),
        }
    }

    /// The event broadcaster shared with the queue hub.
    pub fn broadcaster(&self) -> &EventBroadcaster {
        self.hub.broadcaster()
    }

    /// Attaches the name and email of each entry's customer.
    pub async fn with_customers(&self, mut views: Vec<EntryView>) -> Vec<EntryView> {
        let summaries = self
            .users
            .customer_summaries(views.iter().map(|v| v.entry.customer_id))
            .await;
        for view in &mut views {
            view.user = summaries.get(&view.entry.customer_id).cloned();
        }
        views
    }

    /// A single entry with its customer's summary.
    pub async fn customer_view(&self, entry: QueueEntry) -> EntryView {
        let user = self.users.get(entry.customer_id).await.ok();
        EntryView {
            user: user.as_ref().map(CustomerSummary::from),
            ..EntryView::new(entry)
        }
    }

    /// Attaches the name, category and location of each entry's provider.
    pub async fn with_providers(&self, mut views: Vec<EntryView>) -> Vec<EntryView> {
        let summaries = self
            .providers
            .summaries(views.iter().map(|v| v.entry.provider_id))
            .await;
        for view in &mut views {
            view.provider = summaries.get(&view.entry.provider_id).cloned();
        }
        views
    }

    /// Creates the configured bootstrap admin if no admin exists yet.
    ///
    /// # Errors
    ///
    /// Fails if the configured account cannot be created, e.g. because its
    /// email already belongs to a non-admin account.
    pub async fn seed_admin(&self) -> Result<Option<User>> {
        match &self.config.admin_seed {
            Some(seed) => {
                self.users
                    .seed_admin(&seed.name, &seed.email, &seed.password)
                    .await
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("sessions", &self.sessions)
            .field("hub", &self.hub)
            .field("start_time", &self.start_time)
            .finish()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Creates the application router with all routes configured.
///
/// # Example
///
/// ```rust,no_run
/// use smartqueue_server::routes::{create_router, AppState};
/// use smartqueue_server::config::Config;
///
/// let config = Config::from_env().expect("failed to load config");
/// let state = AppState::new(config);
/// let router = create_router(state);
/// ```
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.client_origin);

    let api = Router::new()
        .nest("/auth", auth::router())
        .nest("/providers", providers::router())
        .nest("/queue", queue::router())
        .nest("/store", store::router())
        .nest("/admin", admin::router());

    Router::new()
        .nest("/api", api)
        .route("/ws", get(ws::get_ws))
        .route("/health", get(get_health))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origin: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);

    if origin == "*" {
        return layer.allow_origin(Any);
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => layer.allow_origin(value),
        Err(err) => {
            warn!(origin, error = %err, "Invalid client origin, allowing any origin");
            layer.allow_origin(Any)
        }
    }
}

// ============================================================================
// Extractors
// ============================================================================

/// JSON request body whose rejection is reported as a [`ServerError`].
#[derive(Debug, Clone)]
pub struct Payload<T>(pub T);

impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// A single UUID path segment.
#[derive(Debug, Clone, Copy)]
pub struct EntityId(pub Uuid);

impl<S> FromRequestParts<S> for EntityId
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let Path(id) = Path::<Uuid>::from_request_parts(parts, state)
            .await
            .map_err(|_| ServerError::validation("Invalid id"))?;
        Ok(Self(id))
    }
}

/// Plain acknowledgement body.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

// ============================================================================
// GET /health - Health Check
// ============================================================================

/// Response body for health check endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Server status (always "ok" if responding).
    pub status: String,

    /// Number of active WebSocket connections.
    pub connections: usize,

    /// Server uptime in seconds.
    pub uptime_seconds: u64,
}

/// GET /health - Health check endpoint.
///
/// No authentication required.
///
/// # Response
///
/// ```json
/// {
///   "status": "ok",
///   "connections": 42,
///   "uptime_seconds": 3600
/// }
/// ```
async fn get_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        connections: state.broadcaster().subscriber_count(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::accounts::NewUser;
    use crate::types::Role;

    async fn body_json(response: axum::response::Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_returns_ok_status() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();

        assert_eq!(health.status, "ok");
        assert_eq!(health.connections, 0);
    }

    #[tokio::test]
    async fn health_reports_subscriber_count() {
        let state = AppState::new(Config::default());
        let _subscriber = state.broadcaster().subscribe();
        let app = create_router(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(body_json(response).await["connections"], 1);
    }

    #[tokio::test]
    async fn protected_route_without_token_is_unauthenticated() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/auth/me")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["message"], "No token provided");
        assert_eq!(body["code"], "unauthenticated");
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header("Content-Type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "validation");
    }

    #[tokio::test]
    async fn invalid_path_id_is_a_validation_error() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/providers/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let app = create_router(AppState::new(Config::default()));

        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri("/api/providers")
                    .header("Origin", "http://localhost:5173")
                    .header("Access-Control-Request-Method", "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn seed_admin_uses_configured_credentials() {
        let config = Config {
            admin_seed: Some(crate::config::AdminSeed {
                name: "Root".to_string(),
                email: "root@example.com".to_string(),
                password: "changeme".to_string(),
            }),
            ..Config::default()
        };
        let state = AppState::new(config);

        let admin = state.seed_admin().await.unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert!(state.seed_admin().await.unwrap().is_none());

        let app = create_router(state);
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/login")
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        json!({ "email": "ROOT@example.com", "password": "changeme" }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["user"]["role"], "admin");
    }

    #[tokio::test]
    async fn seed_admin_without_config_is_a_no_op() {
        let state = AppState::new(Config::default());
        state
            .users
            .create(NewUser::new("C", "c@example.com", "pw", Role::Customer))
            .await
            .unwrap();
        assert!(state.seed_admin().await.unwrap().is_none());
        assert!(!state.users.has_admin().await);
    }
}
