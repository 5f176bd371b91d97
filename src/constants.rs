//! Timing constants for countdowns and reveal animations
//!
//! This module contains the default cadences and the validation bounds
//! used by the configuration types, so every screen paces its timers
//! from the same set of numbers.

/// Countdown cadence constants
pub mod countdown {
    /// Interval in milliseconds between local countdown decrements
    pub const TICK_INTERVAL_MS: u64 = 1000;
    /// Length in milliseconds of the server reconciliation window
    pub const SYNC_WINDOW_MS: u64 = 2000;
    /// Interval in milliseconds between reconciliation polls
    pub const SYNC_POLL_INTERVAL_MS: u64 = 100;
    /// Minimum allowed interval in milliseconds between reconciliation polls
    pub const MIN_INTERVAL_MS: u64 = 10;
    /// Maximum allowed reconciliation window in milliseconds
    pub const MAX_SYNC_WINDOW_MS: u64 = 10_000;
}

/// Reveal animation constants
pub mod reveal {
    /// Delay in milliseconds before the first item starts animating
    pub const BASE_DELAY_MS: u64 = 200;
    /// Additional delay in milliseconds per ordinal position
    pub const STAGGER_INCREMENT_MS: u64 = 150;
    /// Length in milliseconds of a single item's animation
    pub const DURATION_MS: u64 = 1200;
    /// Exponent of the ease-out curve (quartic)
    pub const EASING_POWER: i32 = 4;
    /// Minimum allowed easing exponent
    pub const MIN_EASING_POWER: i32 = 1;
    /// Maximum allowed easing exponent
    pub const MAX_EASING_POWER: i32 = 8;
    /// Maximum allowed animation length in milliseconds
    pub const MAX_DURATION_MS: u64 = 10_000;
}

/// Frame scheduling constants
pub mod frame {
    /// Interval in milliseconds between simulated rendered frames (~60 Hz)
    pub const FRAME_INTERVAL_MS: u64 = 16;
}
