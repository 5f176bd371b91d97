//! # Fuiz Pacing Library
//!
//! This library provides the client-side pacing primitives used by Fuiz host
//! and player screens: a countdown that reconciles against the server's
//! phase start time and announces its expiry exactly once, and a staggered
//! reveal animator for result counters, answer bars and leaderboard rows.
//!
//! Both primitives are driven by a [`scheduler::Scheduler`]: they schedule
//! [`Alarm`]s and the host hands each alarm back through `receive_alarm`
//! when it falls due.

#![cfg_attr(all(coverage_nightly, test), feature(coverage_attribute))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::wildcard_imports)]
use serde::{Deserialize, Serialize};

pub mod clock;
pub mod config;
pub mod constants;
pub mod countdown;
pub mod error;
pub mod reveal;
pub mod scheduler;

pub use error::{Error, Result};

/// Alarm messages for scheduled work in the different primitives
///
/// The host stores these alongside its timers and passes them back to the
/// primitive that scheduled them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, derive_more::From)]
pub enum Alarm {
    /// Countdown ticks, reconciliation polls and expiry notifications
    Countdown(countdown::Alarm),
    /// Reveal animation start delays and frames
    Reveal(reveal::Alarm),
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_from_countdown() {
        let alarm: Alarm = countdown::Alarm::Expire {
            slot: 3,
            generation: 1,
        }
        .into();
        assert!(matches!(
            alarm,
            Alarm::Countdown(countdown::Alarm::Expire { slot: 3, .. })
        ));
    }

    #[test]
    fn test_alarm_serialization() {
        let alarm: Alarm = reveal::Alarm::Frame {
            slot: 1,
            generation: 2,
        }
        .into();
        let json = serde_json::to_string(&alarm).unwrap();
        assert!(json.contains("Reveal"));
        assert!(json.contains("Frame"));

        let back: Alarm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, alarm);
    }
}
