//! Access control gate.
//!
//! This module turns a bearer credential into a caller identity and provides
//! the role checks route handlers use to reject unauthorized operations.
//!
//! # Overview
//!
//! 1. A user logs in with email and password. The password is verified
//!    against the argon2 hash held by the user directory.
//! 2. The server issues an opaque session token (see [`crate::session`]).
//! 3. Each request presents `Authorization: Bearer <token>`. The [`Caller`]
//!    extractor validates the session and resolves the *current* account, so
//!    role changes and deletions apply to tokens already issued.
//!
//! # Example
//!
//! ```rust
//! use smartqueue_server::auth::{hash_password, verify_password, PasswordError};
//!
//! let hash = hash_password("correct horse").unwrap();
//! assert!(verify_password("correct horse", &hash).is_ok());
//! assert_eq!(
//!     verify_password("battery staple", &hash),
//!     Err(PasswordError::Mismatch)
//! );
//! ```

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    Error as PasswordHashError, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::accounts::UserDirectory;
use crate::error::{Result, ServerError};
use crate::routes::AppState;
use crate::session::SessionStore;
use crate::types::{Role, User};

/// Errors from password hashing and verification.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PasswordError {
    /// The candidate password does not match the stored hash.
    #[error("password does not match")]
    Mismatch,

    /// Hashing failed.
    #[error("failed to hash password: {0}")]
    Hash(String),

    /// The stored hash is not a valid PHC string.
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
}

/// Hashes a password into an argon2 PHC string with a fresh random salt.
///
/// # Errors
///
/// Returns [`PasswordError::Hash`] if argon2 rejects the input.
pub fn hash_password(password: &str) -> std::result::Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

/// Verifies `candidate` against a PHC string produced by [`hash_password`].
///
/// # Errors
///
/// - [`PasswordError::Mismatch`] if the password is wrong
/// - [`PasswordError::MalformedHash`] if `hash` cannot be parsed
pub fn verify_password(candidate: &str, hash: &str) -> std::result::Result<(), PasswordError> {
    let parsed = PasswordHash::new(hash).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .map_err(|e| match e {
            PasswordHashError::Password => PasswordError::Mismatch,
            other => PasswordError::Hash(other.to_string()),
        })
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// The scheme is matched case-insensitively. Returns `None` if the header is
/// absent, not UTF-8, uses another scheme, or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolves a session token to the account it was issued for.
///
/// # Errors
///
/// Returns [`ServerError::Unauthenticated`] if the token is unknown or
/// expired, or its account no longer exists.
pub async fn authenticate(
    sessions: &SessionStore,
    users: &UserDirectory,
    token: &str,
) -> Result<User> {
    let session = sessions
        .validate_session(token)
        .ok_or_else(|| ServerError::unauthenticated("Invalid token"))?;

    match users.get(session.user_id).await {
        Ok(user) => Ok(user),
        Err(_) => {
            debug!(user_id = %session.user_id, "Session refers to a deleted account");
            sessions.remove_session(token);
            Err(ServerError::unauthenticated("Invalid token"))
        }
    }
}

/// The authenticated identity behind a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: User,
    token: String,
}

impl Caller {
    pub fn id(&self) -> Uuid {
        self.user.id
    }

    pub fn role(&self) -> Role {
        self.user.role
    }

    /// The session token the request was made with.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn require_admin(&self) -> Result<()> {
        self.require(self.role().is_admin(), "Admin access required")
    }

    /// Staff or admin.
    pub fn require_queue_operator(&self) -> Result<()> {
        self.require(self.role().can_operate_queues(), "Forbidden")
    }

    pub fn require_store_owner(&self) -> Result<()> {
        self.require(
            self.role() == Role::StoreOwner,
            "Store owner access required",
        )
    }

    /// Store owner or staff.
    pub fn require_store_member(&self) -> Result<()> {
        self.require(self.role().is_store_member(), "Access denied")
    }

    fn require(&self, allowed: bool, message: &str) -> Result<()> {
        if allowed {
            Ok(())
        } else {
            debug!(user_id = %self.user.id, role = %self.user.role, "Role check failed");
            Err(ServerError::forbidden(message))
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .ok_or_else(|| ServerError::unauthenticated("No token provided"))?
            .to_string();
        let user = authenticate(&state.sessions, &state.users, &token).await?;
        Ok(Self { user, token })
    }
}
