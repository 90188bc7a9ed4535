//! Server configuration module.
//!
//! Parses configuration from environment variables for the SmartQueue server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `PORT` | No | 3001 | HTTP server port |
//! | `SMARTQUEUE_CLIENT_ORIGIN` | No | `http://localhost:5173` | Origin allowed by CORS |
//! | `SMARTQUEUE_DEFAULT_SERVICE_MINUTES` | No | 10 | Per-head service time, at least 1 |
//! | `SMARTQUEUE_SESSION_TTL_SECS` | No | 604800 | Bearer token lifetime |
//! | `SMARTQUEUE_ADMIN_EMAIL` | No* | - | Email of the bootstrap admin |
//! | `SMARTQUEUE_ADMIN_PASSWORD` | No* | - | Password of the bootstrap admin |
//! | `SMARTQUEUE_ADMIN_NAME` | No | `System Administrator` | Display name of the bootstrap admin |
//!
//! *Set both or neither.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;
use crate::session::DEFAULT_TTL_SECS;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 3001;

/// Default CORS origin (the Vite dev server).
const DEFAULT_CLIENT_ORIGIN: &str = "http://localhost:5173";

/// Default per-head service time in minutes.
const DEFAULT_SERVICE_MINUTES: u32 = 10;

const DEFAULT_ADMIN_NAME: &str = "System Administrator";

/// Credentials of the admin account created at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminSeed {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Server configuration parsed from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port.
    pub port: u16,

    /// Origin allowed to call the API from a browser.
    pub client_origin: String,

    /// Default allotted service duration and wait-estimate slot, in minutes.
    pub default_service_minutes: u32,

    /// Lifetime of a login session.
    pub session_ttl: Duration,

    /// Bootstrap admin, if configured.
    pub admin_seed: Option<AdminSeed>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            client_origin: DEFAULT_CLIENT_ORIGIN.to_string(),
            default_service_minutes: DEFAULT_SERVICE_MINUTES,
            session_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            admin_seed: None,
        }
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - A numeric variable does not parse or is out of range
    /// - Only one of the admin email and password is set
    ///
    /// # Example
    ///
    /// ```no_run
    /// use smartqueue_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Server will listen on port {}", config.port);
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_env("PORT", DEFAULT_PORT)?;
        let client_origin = env::var("SMARTQUEUE_CLIENT_ORIGIN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLIENT_ORIGIN.to_string());
        let default_service_minutes = parse_env(
            "SMARTQUEUE_DEFAULT_SERVICE_MINUTES",
            DEFAULT_SERVICE_MINUTES,
        )?;
        let session_ttl_secs = parse_env("SMARTQUEUE_SESSION_TTL_SECS", DEFAULT_TTL_SECS)?;
        let admin_seed = parse_admin_seed()?;

        let config = Self {
            port,
            client_origin,
            default_service_minutes,
            session_ttl: Duration::from_secs(session_ttl_secs),
            admin_seed,
        };

        config.validate()?;

        if config.admin_seed.is_none() {
            warn!(
                "No bootstrap admin configured. Set SMARTQUEUE_ADMIN_EMAIL and \
                 SMARTQUEUE_ADMIN_PASSWORD to create one at startup"
            );
        }

        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_service_minutes == 0 {
            return Err(ConfigError::invalid(
                "SMARTQUEUE_DEFAULT_SERVICE_MINUTES",
                "must be at least 1",
            ));
        }

        if self.session_ttl.is_zero() {
            return Err(ConfigError::invalid(
                "SMARTQUEUE_SESSION_TTL_SECS",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

/// Parse an optional environment variable, falling back to `default`.
fn parse_env<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(name, e.to_string())),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(env::VarError::NotUnicode(_)) => {
            Err(ConfigError::invalid(name, "contains invalid unicode"))
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse the bootstrap admin variables. Email and password go together.
fn parse_admin_seed() -> Result<Option<AdminSeed>, ConfigError> {
    let email = non_empty_env("SMARTQUEUE_ADMIN_EMAIL");
    let password = non_empty_env("SMARTQUEUE_ADMIN_PASSWORD");

    match (email, password) {
        (Some(email), Some(password)) => Ok(Some(AdminSeed {
            name: non_empty_env("SMARTQUEUE_ADMIN_NAME")
                .unwrap_or_else(|| DEFAULT_ADMIN_NAME.to_string()),
            email,
            password,
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ConfigError::missing("SMARTQUEUE_ADMIN_PASSWORD")),
        (None, Some(_)) => Err(ConfigError::missing("SMARTQUEUE_ADMIN_EMAIL")),
    }
}
