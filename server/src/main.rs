//! SmartQueue Server - Main entry point.
//!
//! This binary starts the SmartQueue server with:
//! - Structured JSON logging for production
//! - Bootstrap admin seeding
//! - Background cleanup of expired sessions
//! - Graceful shutdown handling (SIGTERM/SIGINT)
//!
//! # Configuration
//!
//! See [`smartqueue_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! SMARTQUEUE_ADMIN_EMAIL="admin@example.com" \
//! SMARTQUEUE_ADMIN_PASSWORD="change-me" \
//! PORT=3001 \
//! cargo run --release --bin smartqueue-server
//! ```

use std::process::ExitCode;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use smartqueue_server::config::Config;
use smartqueue_server::routes::{create_router, AppState};

/// Cleanup interval for expired login sessions.
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "Failed to load configuration");
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                               - HTTP server port (default: 3001)");
            eprintln!("  RUST_LOG                           - Log level filter (default: info)");
            eprintln!("  SMARTQUEUE_CLIENT_ORIGIN           - CORS origin (default: http://localhost:5173)");
            eprintln!("  SMARTQUEUE_DEFAULT_SERVICE_MINUTES - Per-head service time (default: 10)");
            eprintln!("  SMARTQUEUE_SESSION_TTL_SECS        - Token lifetime (default: 604800)");
            eprintln!("  SMARTQUEUE_ADMIN_EMAIL             - Bootstrap admin email");
            eprintln!("  SMARTQUEUE_ADMIN_PASSWORD          - Bootstrap admin password");
            eprintln!("  SMARTQUEUE_ADMIN_NAME              - Bootstrap admin display name");
            return ExitCode::from(1);
        }
    };

    info!(
        port = config.port,
        client_origin = %config.client_origin,
        default_service_minutes = config.default_service_minutes,
        "SmartQueue server starting"
    );

    let state = AppState::new(config.clone());

    match state.seed_admin().await {
        Ok(Some(admin)) => info!(user_id = %admin.id, email = %admin.email, "Admin account ready"),
        Ok(None) => {}
        Err(err) => {
            error!(error = %err, "Failed to seed admin account");
            return ExitCode::from(1);
        }
    }

    let cleanup_handle = state.sessions.spawn_cleanup_task(SESSION_CLEANUP_INTERVAL);
    info!(
        interval_secs = SESSION_CLEANUP_INTERVAL.as_secs(),
        "Session cleanup task started"
    );

    let app = create_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => {
            info!(port = config.port, address = %bind_addr, "Server listening");
            listener
        }
        Err(err) => {
            error!(error = %err, address = %bind_addr, "Failed to bind to address");
            return ExitCode::from(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    info!("Server ready to accept connections");

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        return ExitCode::from(1);
    }

    info!("Server shutting down gracefully");

    cleanup_handle.abort();
    info!("Session cleanup task stopped");

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Initialize structured logging with tracing.
///
/// JSON output, filtered by `RUST_LOG` with a default of `info`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGINT or SIGTERM is received.
///
/// If a handler cannot be installed the error is logged and that signal is
/// never observed.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
