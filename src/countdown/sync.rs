//! Reconciliation against a server-declared phase start

use std::time::Duration;

use web_time::SystemTime;

use crate::clock::Timestamp;

/// Computes the seconds left in a phase as seen by the server
///
/// # Arguments
///
/// * `duration_seconds` - Total length of the phase
/// * `server_start` - When the server says the phase began
/// * `now` - The local current time
///
/// # Returns
///
/// `duration_seconds - floor(elapsed)` saturated at zero, or the full
/// duration while `now` is still before `server_start`
pub fn reconciled_remaining(
    duration_seconds: u64,
    server_start: Timestamp,
    now: SystemTime,
) -> u64 {
    server_start
        .elapsed_at(now)
        .map_or(duration_seconds, |elapsed| {
            duration_seconds.saturating_sub(elapsed.as_secs())
        })
}

/// Returns how long until `server_start` arrives, zero once it has passed
pub fn lead_time(server_start: Timestamp, now: SystemTime) -> Duration {
    server_start
        .to_system_time()
        .duration_since(now)
        .unwrap_or_default()
}

/// The bounded period during which a countdown polls the server time
///
/// The window opens at `max(observed_at, server_start)` so a start time that
/// is still in the future keeps the countdown clamped until it arrives and
/// then reconciles for the full window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncWindow {
    server_start: Timestamp,
    observed_at: SystemTime,
    closes_at: SystemTime,
}

impl SyncWindow {
    /// Opens a window for `server_start`, first observed at `now`
    pub fn open(server_start: Timestamp, now: SystemTime, length: Duration) -> Self {
        let opens_at = now.max(server_start.to_system_time());
        Self {
            server_start,
            observed_at: now,
            closes_at: opens_at + length,
        }
    }

    /// Returns the server start time this window reconciles against
    pub fn server_start(&self) -> Timestamp {
        self.server_start
    }

    /// Returns whether reconciliation should stop at `now`
    pub fn is_closed(&self, now: SystemTime) -> bool {
        now >= self.closes_at
    }

    /// Returns how long reconciliation has been attempted as of `now`
    pub fn elapsed(&self, now: SystemTime) -> Duration {
        now.duration_since(self.observed_at).unwrap_or_default()
    }
}
