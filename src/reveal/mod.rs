//! Staggered reveal animations
//!
//! Result and leaderboard screens count numbers up and grow bars from zero
//! once their data arrives. Siblings start one after another so the reveal
//! cascades down the list. [`StaggeredRevealAnimator`] drives one such item
//! and [`board::RevealBoard`] keeps one animator per item identity.

pub mod board;
pub mod easing;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use web_time::SystemTime;

use crate::{
    config::RevealConfig,
    scheduler::{Scheduler, TimerId},
};

/// Alarm messages for reveal animations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alarm {
    /// The staggered start delay has passed
    Start {
        /// Animator the alarm belongs to
        slot: u32,
        /// Animation generation the alarm was scheduled in
        generation: u64,
    },
    /// A rendered frame is due
    Frame {
        /// Animator the alarm belongs to
        slot: u32,
        /// Animation generation the alarm was scheduled in
        generation: u64,
    },
}

impl Alarm {
    /// Returns the slot of the animator this alarm belongs to
    pub fn slot(&self) -> u32 {
        match self {
            Self::Start { slot, .. } | Self::Frame { slot, .. } => *slot,
        }
    }

    /// Returns the generation this alarm was scheduled in
    pub fn generation(&self) -> u64 {
        match self {
            Self::Start { generation, .. } | Self::Frame { generation, .. } => *generation,
        }
    }
}

/// How intermediate values are presented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precision {
    /// Whole numbers, for counters and scores
    #[default]
    Integer,
    /// Unrounded values, for bar heights and percentages
    Continuous,
}

impl Precision {
    fn apply(self, value: f64) -> f64 {
        match self {
            Self::Integer => value.round(),
            Self::Continuous => value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Playback {
    Idle,
    Delayed,
    Running { started_at: SystemTime },
    Complete,
}

/// Animates one displayed value from zero to its target
///
/// The animator is keyed by an item identity `K` (an answer choice, a
/// leaderboard row). Re-rendering the same item with the same target never
/// replays a finished animation.
#[derive(Debug)]
pub struct StaggeredRevealAnimator<K> {
    identity: K,
    target_value: f64,
    ordinal: usize,
    should_animate: bool,
    precision: Precision,
    config: RevealConfig,

    current_value: f64,
    has_completed_once: bool,
    playback: Playback,
    torn_down: bool,

    slot: u32,
    generation: u64,
    timer: Option<TimerId>,
}

impl<K> StaggeredRevealAnimator<K>
where
    K: Clone + PartialEq + Debug,
{
    /// Creates an idle animator resting at zero
    ///
    /// Nothing is scheduled until [`update`](Self::update) opens the
    /// `should_animate` gate.
    pub fn new(identity: K, target_value: f64, ordinal: usize, precision: Precision) -> Self {
        Self {
            identity,
            target_value,
            ordinal,
            should_animate: false,
            precision,
            config: RevealConfig::default(),
            current_value: 0.0,
            has_completed_once: false,
            playback: Playback::Idle,
            torn_down: false,
            slot: 0,
            generation: 0,
            timer: None,
        }
    }

    /// Replaces the default timing
    #[must_use]
    pub fn with_config(mut self, config: RevealConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the slot used to route this animator's alarms
    #[must_use]
    pub fn with_slot(mut self, slot: u32) -> Self {
        self.slot = slot;
        self
    }

    /// Returns the identity of the displayed item
    pub fn identity(&self) -> &K {
        &self.identity
    }

    /// Returns the value being animated towards
    pub fn target_value(&self) -> f64 {
        self.target_value
    }

    /// Returns the position among siblings
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Returns the value to display
    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    /// Returns whether the animation reached its target for the current item and target
    pub fn has_completed_once(&self) -> bool {
        self.has_completed_once
    }

    /// Returns whether a start delay or frame is pending
    pub fn is_animating(&self) -> bool {
        matches!(self.playback, Playback::Delayed | Playback::Running { .. })
    }

    /// Returns whether the animator has been torn down
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Applies the inputs passed in by the owning screen
    ///
    /// # Arguments
    ///
    /// * `identity` - Identity of the displayed item; a new one restarts from zero
    /// * `target_value` - Value to reach; a new one restarts from zero
    /// * `ordinal` - Position among siblings, used for the next start delay
    /// * `should_animate` - Gate; opening it restarts, closing it rests at zero
    /// * `scheduler` - Scheduler for the start delay and frames
    ///
    /// When nothing but the ordinal changed the call is a re-render: a
    /// running animation continues and a finished one stays at its target.
    pub fn update<S: Scheduler>(
        &mut self,
        identity: K,
        target_value: f64,
        ordinal: usize,
        should_animate: bool,
        scheduler: &mut S,
    ) {
        if self.torn_down {
            return;
        }

        self.ordinal = ordinal;

        if identity != self.identity {
            debug!(from = ?self.identity, to = ?identity, "new item, restarting reveal");
            self.identity = identity;
            self.target_value = target_value;
            self.should_animate = should_animate;
            self.restart(scheduler);
            return;
        }

        let target_changed = target_value.to_bits() != self.target_value.to_bits();
        let gate_changed = should_animate != self.should_animate;
        self.target_value = target_value;
        self.should_animate = should_animate;

        if target_changed || gate_changed {
            self.restart(scheduler);
        }
    }

    /// Cancels any pending delay or frame for good
    ///
    /// Tearing down twice is a no-op.
    pub fn teardown<S: Scheduler>(&mut self, scheduler: &mut S) {
        if self.torn_down {
            return;
        }

        trace!(identity = ?self.identity, "tearing down reveal");
        self.cancel(scheduler);
        self.torn_down = true;
        if self.is_animating() {
            self.playback = Playback::Idle;
        }
    }

    /// Handles an alarm delivered by the scheduler
    ///
    /// # Returns
    ///
    /// `true` if the alarm belonged to this animator's current animation
    pub fn receive_alarm<S: Scheduler>(&mut self, scheduler: &mut S, alarm: &crate::Alarm) -> bool {
        let crate::Alarm::Reveal(alarm) = alarm else {
            return false;
        };

        if self.torn_down || alarm.slot() != self.slot || alarm.generation() != self.generation {
            trace!(?alarm, generation = self.generation, "ignoring stale reveal alarm");
            return false;
        }

        self.timer = None;
        match alarm {
            Alarm::Start { .. } => self.begin(scheduler),
            Alarm::Frame { .. } => self.frame(scheduler),
        }

        true
    }

    fn cancel<S: Scheduler>(&mut self, scheduler: &mut S) {
        if let Some(timer) = self.timer.take() {
            scheduler.cancel(timer);
        }
        self.generation += 1;
    }

    fn restart<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.cancel(scheduler);
        self.current_value = 0.0;
        self.has_completed_once = false;
        self.playback = Playback::Idle;

        if self.should_animate {
            let delay = self.config.start_delay(self.ordinal);
            trace!(identity = ?self.identity, ?delay, "scheduling reveal");
            self.playback = Playback::Delayed;
            self.timer = Some(scheduler.schedule_once(
                Alarm::Start {
                    slot: self.slot,
                    generation: self.generation,
                }
                .into(),
                delay,
            ));
        }
    }

    fn begin<S: Scheduler>(&mut self, scheduler: &mut S) {
        if self.playback != Playback::Delayed {
            return;
        }

        self.playback = Playback::Running {
            started_at: scheduler.now(),
        };
        self.request_frame(scheduler);
    }

    fn frame<S: Scheduler>(&mut self, scheduler: &mut S) {
        let Playback::Running { started_at } = self.playback else {
            return;
        };

        let elapsed = scheduler
            .now()
            .duration_since(started_at)
            .unwrap_or_default();
        let progress = easing::progress(elapsed, self.config.duration());

        if progress >= 1.0 {
            self.current_value = self.precision.apply(self.target_value);
            self.has_completed_once = true;
            self.playback = Playback::Complete;
            debug!(identity = ?self.identity, value = self.current_value, "reveal complete");
        } else {
            let eased = easing::ease_out(progress, self.config.easing_power());
            self.current_value = self.precision.apply(self.target_value * eased);
            self.request_frame(scheduler);
        }
    }

    fn request_frame<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.timer = Some(scheduler.request_frame(
            Alarm::Frame {
                slot: self.slot,
                generation: self.generation,
            }
            .into(),
        ));
    }
}
