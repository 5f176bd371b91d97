//! Pacing configuration
//!
//! Screens used to carry their own copies of the poll and stagger constants.
//! These types collect them into one validated, serializable place so a host
//! can ship a single pacing profile to every screen. Fields are only reachable
//! through the validating constructors, and deserialization validates too.

use std::time::Duration;

use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::constants;

type ValidationResult = garde::Result;

/// Validates that a duration, in milliseconds, falls within the given bounds
///
/// # Arguments
///
/// * `field` - Name of the field being validated (for error messages)
/// * `val` - The duration value to validate
///
/// # Returns
///
/// `Ok(())` if the duration is valid, `Err` with descriptive message if not
fn validate_millis<const MIN_MS: u64, const MAX_MS: u64>(
    field: &'static str,
    val: &Duration,
) -> ValidationResult {
    if (u128::from(MIN_MS)..=u128::from(MAX_MS)).contains(&val.as_millis()) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "{field} is outside of the bounds [{MIN_MS},{MAX_MS}] ms",
        )))
    }
}

fn validate_sync_window(val: &Duration) -> ValidationResult {
    validate_millis::<0, { constants::countdown::MAX_SYNC_WINDOW_MS }>("sync_window", val)
}

fn validate_sync_poll_interval(val: &Duration) -> ValidationResult {
    validate_millis::<
        { constants::countdown::MIN_INTERVAL_MS },
        { constants::countdown::MAX_SYNC_WINDOW_MS },
    >("sync_poll_interval", val)
}

fn validate_reveal_delay(field: &'static str, val: &Duration) -> ValidationResult {
    validate_millis::<0, { constants::reveal::MAX_DURATION_MS }>(field, val)
}

fn validate_reveal_duration(val: &Duration) -> ValidationResult {
    validate_millis::<1, { constants::reveal::MAX_DURATION_MS }>("duration", val)
}

/// Wire form of [`CountdownConfig`], validated on conversion
#[serde_with::serde_as]
#[derive(Deserialize)]
struct CountdownConfigSerde {
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    sync_window: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    sync_poll_interval: Duration,
}

/// Reconciliation cadence of a [`SyncedCountdown`](crate::countdown::SyncedCountdown)
///
/// The synchronization window and poll interval are a single pair shared by
/// every screen. With a zero window the countdown reconciles once, when the
/// server start time is observed, and then ticks locally. Local ticks always
/// come once per second.
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(try_from = "CountdownConfigSerde")]
pub struct CountdownConfig {
    /// How long reconciliation against a server start timestamp lasts
    #[garde(custom(|v, _| validate_sync_window(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    sync_window: Duration,
    /// Interval between reconciliation polls inside the window
    #[garde(custom(|v, _| validate_sync_poll_interval(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    sync_poll_interval: Duration,
}

impl TryFrom<CountdownConfigSerde> for CountdownConfig {
    type Error = crate::Error;

    fn try_from(serde: CountdownConfigSerde) -> crate::Result<Self> {
        Self::new(serde.sync_window, serde.sync_poll_interval)
    }
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            sync_window: Duration::from_millis(constants::countdown::SYNC_WINDOW_MS),
            sync_poll_interval: Duration::from_millis(
                constants::countdown::SYNC_POLL_INTERVAL_MS,
            ),
        }
    }
}

impl CountdownConfig {
    /// Creates a validated countdown configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if any
    /// interval is outside of its allowed bounds.
    pub fn new(sync_window: Duration, sync_poll_interval: Duration) -> crate::Result<Self> {
        let config = Self {
            sync_window,
            sync_poll_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a configuration from JSON
    ///
    /// Missing fields are not filled in; hosts are expected to send the
    /// complete profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) for malformed input and
    /// [`Error::InvalidConfig`](crate::Error::InvalidConfig) when the decoded
    /// values fail validation.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let serde: CountdownConfigSerde = serde_json::from_str(json)?;
        serde.try_into()
    }

    /// Returns how long reconciliation lasts once the window opens
    pub fn sync_window(&self) -> Duration {
        self.sync_window
    }

    /// Returns the interval between reconciliation polls
    pub fn sync_poll_interval(&self) -> Duration {
        self.sync_poll_interval
    }
}

#[serde_with::serde_as]
#[derive(Deserialize)]
struct RevealConfigSerde {
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    base_delay: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    stagger_increment: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    duration: Duration,
    easing_power: i32,
}

/// Timing of a set of [`StaggeredRevealAnimator`](crate::reveal::StaggeredRevealAnimator)s
///
/// An item at ordinal `i` starts after `base_delay + i * stagger_increment`
/// and then eases towards its target over `duration`.
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(try_from = "RevealConfigSerde")]
pub struct RevealConfig {
    /// Delay before the first item starts animating
    #[garde(custom(|v, _| validate_reveal_delay("base_delay", v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    base_delay: Duration,
    /// Additional delay per ordinal position
    #[garde(custom(|v, _| validate_reveal_delay("stagger_increment", v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    stagger_increment: Duration,
    /// Length of a single item's animation
    #[garde(custom(|v, _| validate_reveal_duration(v)))]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    duration: Duration,
    /// Exponent of the ease-out curve
    #[garde(range(min = constants::reveal::MIN_EASING_POWER, max = constants::reveal::MAX_EASING_POWER))]
    easing_power: i32,
}

impl TryFrom<RevealConfigSerde> for RevealConfig {
    type Error = crate::Error;

    fn try_from(serde: RevealConfigSerde) -> crate::Result<Self> {
        Self::new(
            serde.base_delay,
            serde.stagger_increment,
            serde.duration,
            serde.easing_power,
        )
    }
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(constants::reveal::BASE_DELAY_MS),
            stagger_increment: Duration::from_millis(constants::reveal::STAGGER_INCREMENT_MS),
            duration: Duration::from_millis(constants::reveal::DURATION_MS),
            easing_power: constants::reveal::EASING_POWER,
        }
    }
}

impl RevealConfig {
    /// Creates a validated reveal configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`](crate::Error::InvalidConfig) if a
    /// delay or the duration is out of bounds, or the easing power is not
    /// between 1 and 8.
    pub fn new(
        base_delay: Duration,
        stagger_increment: Duration,
        duration: Duration,
        easing_power: i32,
    ) -> crate::Result<Self> {
        let config = Self {
            base_delay,
            stagger_increment,
            duration,
            easing_power,
        };
        config.validate()?;
        Ok(config)
    }

    /// Returns the length of a single item's animation
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Returns the exponent of the ease-out curve
    pub fn easing_power(&self) -> i32 {
        self.easing_power
    }

    /// Returns the start delay for the item at `ordinal`
    ///
    /// A zero `stagger_increment` would start siblings together, so it is
    /// raised to one millisecond to keep delays strictly increasing.
    pub fn start_delay(&self, ordinal: usize) -> Duration {
        let step = self.stagger_increment.max(Duration::from_millis(1));
        self.base_delay
            .saturating_add(step.saturating_mul(u32::try_from(ordinal).unwrap_or(u32::MAX)))
    }
}
