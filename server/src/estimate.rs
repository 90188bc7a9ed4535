//! Wait-time estimation.
//!
//! The estimate for the entry at waiting position `P` is the remaining time
//! of whoever is being served right now plus `P − 1` full service slots:
//!
//! ```text
//! wait(P) = max(0, remaining) + (P − 1) × D
//! ```
//!
//! It is a heuristic shown to customers, not a guarantee. An overtime service
//! contributes zero rather than shortening everybody's wait.

/// Estimated wait in minutes for the entry at `position` (1-based).
///
/// `remaining_minutes` is the remaining time of the entry currently being
/// served at the same provider, or `None` if nobody is being served.
///
/// # Example
///
/// ```rust
/// use smartqueue_server::estimate::estimated_wait_minutes;
///
/// assert_eq!(estimated_wait_minutes(1, 10, None), 0.0);
/// assert_eq!(estimated_wait_minutes(3, 10, None), 20.0);
/// assert_eq!(estimated_wait_minutes(2, 10, Some(4.5)), 14.5);
/// ```
pub fn estimated_wait_minutes(
    position: u32,
    service_minutes: u32,
    remaining_minutes: Option<f64>,
) -> f64 {
    let current = remaining_minutes.unwrap_or(0.0).max(0.0);
    let ahead = position.saturating_sub(1);
    current + f64::from(ahead) * f64::from(service_minutes)
}
