//! SmartQueue Server - Virtual queueing for walk-in service providers.
//!
//! This crate provides the server component of SmartQueue, responsible for:
//! - Accounts, login sessions and role-based access control
//! - The provider directory
//! - Per-provider waiting queues and the single serving slot of each provider
//! - Broadcasting queue events to every connected WebSocket client
//!
//! # Architecture
//!
//! Customers join a provider's queue, staff call them up, serve them and
//! finish or skip them. Every change is pushed to subscribers in real time.
//! All state is held in memory for the lifetime of the process.

pub mod accounts;
pub mod auth;
pub mod broadcast;
pub mod config;
pub mod error;
pub mod estimate;
pub mod hub;
pub mod providers;
pub mod queue;
pub mod routes;
pub mod serving;
pub mod session;
pub mod types;
