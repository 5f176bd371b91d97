//! Time sources
//!
//! Countdowns compare local time against server-issued epoch timestamps,
//! so the clock here is wall-clock based (`web_time::SystemTime`, which also
//! works in the browser) rather than monotonic.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use web_time::{SystemTime, UNIX_EPOCH};

use crate::error::Error;

/// A source of the current wall-clock time
pub trait Clock {
    /// Returns the current time
    fn now(&self) -> SystemTime;
}

/// The real system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A point in time expressed as milliseconds since the Unix epoch
///
/// This is the shape in which the server announces when a phase began.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::From,
    derive_more::Into,
)]
#[serde(transparent)]
#[display("{_0}ms")]
pub struct Timestamp(u64);

impl Timestamp {
    /// Creates a timestamp from epoch milliseconds
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Returns the epoch milliseconds of this timestamp
    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Converts a `SystemTime` into a timestamp
    ///
    /// Times before the epoch collapse to the epoch itself.
    pub fn from_system_time(time: SystemTime) -> Self {
        Self(
            time.duration_since(UNIX_EPOCH)
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        )
    }

    /// Converts this timestamp into a `SystemTime`
    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.0)
    }

    /// Returns how long ago this timestamp was, relative to `now`
    ///
    /// # Returns
    ///
    /// `None` while `now` is still before the timestamp (a start time
    /// announced by a clock that runs ahead of ours).
    pub fn elapsed_at(self, now: SystemTime) -> Option<Duration> {
        now.duration_since(self.to_system_time()).ok()
    }
}

impl TryFrom<i64> for Timestamp {
    type Error = Error;

    /// Accepts a raw epoch millisecond value as sent over the wire
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTimestamp`] for negative values.
    fn try_from(millis: i64) -> Result<Self, Self::Error> {
        u64::try_from(millis)
            .map(Self)
            .map_err(|_| Error::InvalidTimestamp(millis))
    }
}
