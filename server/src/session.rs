//! Session token store for bearer authentication.
//!
//! Logging in exchanges verified credentials for an opaque session token. The
//! store maps tokens to the user they were issued for; the caller's role is
//! resolved fresh from the user directory on every request, so role changes
//! and deletions take effect immediately.
//!
//! # Token Format
//!
//! Session tokens are 32 bytes of cryptographically secure random data,
//! base64-url encoded without padding, resulting in 43 character tokens.
//!
//! # Thread Safety
//!
//! The [`SessionStore`] uses interior mutability with [`RwLock`] for
//! thread-safe access across async tasks. No lock is held across an await.
//!
//! # Example
//!
//! ```rust
//! use smartqueue_server::session::{SessionStore, SessionStoreConfig};
//! use uuid::Uuid;
//!
//! let store = SessionStore::new(SessionStoreConfig::default());
//! let user_id = Uuid::new_v4();
//!
//! let token = store.create_session(user_id).expect("store has capacity");
//! let session = store.validate_session(&token).expect("fresh session is valid");
//! assert_eq!(session.user_id, user_id);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Default session TTL (7 days).
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// Maximum number of sessions.
const DEFAULT_MAX_CAPACITY: usize = 10_000;

/// Size of the random token in bytes.
const TOKEN_BYTES: usize = 32;

/// Expected length of base64-url encoded token (43 characters).
const TOKEN_LENGTH: usize = 43;

/// Errors that can occur during session operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session store has reached maximum capacity.
    #[error("session store at maximum capacity ({max_capacity} sessions)")]
    AtCapacity {
        /// The maximum number of sessions allowed.
        max_capacity: usize,
    },
}

/// Configuration for the session store.
#[derive(Debug, Clone)]
pub struct SessionStoreConfig {
    /// Maximum number of concurrent sessions.
    pub max_capacity: usize,

    /// Time-to-live for new sessions.
    pub default_ttl: Duration,
}

impl Default for SessionStoreConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
        }
    }
}

impl SessionStoreConfig {
    /// Creates a new configuration with custom values.
    pub fn new(max_capacity: usize, default_ttl: Duration) -> Self {
        Self {
            max_capacity,
            default_ttl,
        }
    }
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    /// The user the token was issued for.
    pub user_id: Uuid,

    /// When the session was created.
    pub created_at: Instant,

    /// When the session expires.
    pub expires_at: Instant,
}

impl Session {
    fn new(user_id: Uuid, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            user_id,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Returns the remaining time until expiration, or zero if expired.
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Thread-safe in-memory session store.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    config: SessionStoreConfig,
}

impl SessionStore {
    /// Creates a new session store with the given configuration.
    pub fn new(config: SessionStoreConfig) -> Self {
        debug!(
            max_capacity = config.max_capacity,
            ttl_secs = config.default_ttl.as_secs(),
            "Creating new session store"
        );
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Issues a new session token for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::AtCapacity`] if the store is full even after
    /// dropping expired sessions.
    pub fn create_session(&self, user_id: Uuid) -> Result<String, SessionError> {
        // Generate token first (outside of lock)
        let token = generate_session_token();

        let mut sessions = self.write();

        if sessions.len() >= self.config.max_capacity {
            sessions.retain(|_, session| !session.is_expired());
        }
        if sessions.len() >= self.config.max_capacity {
            warn!(
                capacity = sessions.len(),
                max_capacity = self.config.max_capacity,
                "Session store at capacity, rejecting new session"
            );
            return Err(SessionError::AtCapacity {
                max_capacity: self.config.max_capacity,
            });
        }

        trace!(
            user_id = %user_id,
            ttl_secs = self.config.default_ttl.as_secs(),
            "Creating new session"
        );
        sessions.insert(token.clone(), Session::new(user_id, self.config.default_ttl));

        Ok(token)
    }

    /// Returns the session for `token` if it exists and has not expired.
    ///
    /// An expired session is removed on access.
    pub fn validate_session(&self, token: &str) -> Option<Session> {
        if token.len() != TOKEN_LENGTH {
            trace!(token_len = token.len(), "Invalid token length");
            return None;
        }

        {
            let sessions = self.read();
            match sessions.get(token) {
                Some(session) if !session.is_expired() => {
                    trace!(
                        user_id = %session.user_id,
                        remaining_secs = session.remaining_ttl().as_secs(),
                        "Session validated"
                    );
                    return Some(session.clone());
                }
                Some(_) => {}
                None => {
                    trace!("Session token not found");
                    return None;
                }
            }
        }

        self.write().remove(token);
        trace!("Removed expired session during validation");
        None
    }

    /// Removes a session (logout).
    pub fn remove_session(&self, token: &str) -> Option<Session> {
        let removed = self.write().remove(token);
        if let Some(ref session) = removed {
            trace!(user_id = %session.user_id, "Session removed");
        }
        removed
    }

    /// Revokes every session of a user. Returns how many were removed.
    pub fn remove_user_sessions(&self, user_id: Uuid) -> usize {
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| session.user_id != user_id);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(user_id = %user_id, removed, "Revoked user sessions");
        }
        removed
    }

    /// Returns the current number of sessions, expired ones included.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Removes all expired sessions and returns how many were dropped.
    ///
    /// Runs periodically from a background task, complementing the lazy
    /// cleanup on access.
    pub fn cleanup_expired(&self) -> usize {
        let mut sessions = self.write();
        let initial_len = sessions.len();

        sessions.retain(|_, session| !session.is_expired());

        let removed = initial_len - sessions.len();
        if removed > 0 {
            debug!(
                removed_count = removed,
                remaining_count = sessions.len(),
                "Cleaned up expired sessions"
            );
        }
        removed
    }

    /// Spawns a background task that drops expired sessions every
    /// `cleanup_interval`.
    ///
    /// The task runs until the returned handle is aborted.
    pub fn spawn_cleanup_task(
        self: &Arc<Self>,
        cleanup_interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);

            loop {
                interval.tick().await;
                store.cleanup_expired();
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(SessionStoreConfig::default())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("session_count", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Generates a cryptographically secure session token.
fn generate_session_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
