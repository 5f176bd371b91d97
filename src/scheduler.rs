//! Timer and frame scheduling
//!
//! The primitives in this crate never hold on to the event loop. Instead
//! they hand an [`Alarm`] to a [`Scheduler`] together with a cadence, and
//! the host delivers the alarm back to the owning primitive when it is due
//! (`receive_alarm`). Every scheduled alarm has a [`TimerId`] that can be
//! cancelled.
//!
//! [`ManualScheduler`] is a deterministic, single-threaded implementation
//! with a virtual clock. Hosts can drive it from their own event loop, and
//! it is what the tests use to step time.

use std::time::Duration;

use enum_map::{Enum, EnumMap};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::trace;
use web_time::SystemTime;

use crate::{Alarm, clock::Clock, constants};

/// Handle to a scheduled alarm, used for cancellation
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
)]
#[display("timer#{_0}")]
pub struct TimerId(u64);

impl TimerId {
    /// Creates a timer id from a raw value chosen by the scheduler
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value of this id
    pub fn get(self) -> u64 {
        self.0
    }
}

/// The three kinds of scheduled work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
pub enum Cadence {
    /// A fixed-interval callback that keeps firing until cancelled
    Repeating,
    /// A single delayed callback
    Once,
    /// A callback on the next rendered frame
    Frame,
}

/// An event loop capable of delivering alarms back to their owners
///
/// All operations are non-blocking. Cancelling an id that already fired,
/// was already cancelled, or was never issued is a no-op.
pub trait Scheduler: Clock {
    /// Delivers `alarm` every `period` until cancelled
    fn schedule_repeating(&mut self, alarm: Alarm, period: Duration) -> TimerId;

    /// Delivers `alarm` once after `delay`
    ///
    /// A zero delay still defers delivery until after the caller returns.
    fn schedule_once(&mut self, alarm: Alarm, delay: Duration) -> TimerId;

    /// Delivers `alarm` once on the next rendered frame
    fn request_frame(&mut self, alarm: Alarm) -> TimerId;

    /// Cancels a pending alarm
    fn cancel(&mut self, id: TimerId);
}

#[derive(Debug, Clone)]
struct Task {
    id: TimerId,
    due: SystemTime,
    seq: u64,
    cadence: Cadence,
    period: Option<Duration>,
    alarm: Alarm,
}

/// A deterministic scheduler driven by explicit calls to advance time
///
/// Tasks fire in order of due time, ties broken by the order in which
/// they were scheduled. The clock jumps to each task's due time before the
/// alarm is delivered, so primitives observe the same `now()` a real event
/// loop would give them.
#[derive(Debug, Clone)]
pub struct ManualScheduler {
    now: SystemTime,
    frame_interval: Duration,
    next_id: u64,
    next_seq: u64,
    tasks: Vec<Task>,
    fired: EnumMap<Cadence, usize>,
}

impl ManualScheduler {
    /// Creates a scheduler whose clock starts at `start`
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: start,
            frame_interval: Duration::from_millis(constants::frame::FRAME_INTERVAL_MS),
            next_id: 0,
            next_seq: 0,
            tasks: Vec::new(),
            fired: EnumMap::default(),
        }
    }

    /// Sets the interval between simulated frames
    #[must_use]
    pub fn with_frame_interval(mut self, frame_interval: Duration) -> Self {
        self.frame_interval = frame_interval.max(Duration::from_millis(1));
        self
    }

    /// Returns the number of alarms still waiting to fire
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Returns whether `id` is still waiting to fire
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.tasks.iter().any(|task| task.id == id)
    }

    /// Returns how many alarms of the given cadence have been delivered
    pub fn fired(&self, cadence: Cadence) -> usize {
        self.fired[cadence]
    }

    /// Moves the clock forward by `by`, delivering every alarm that falls due
    ///
    /// # Arguments
    ///
    /// * `by` - How far to advance the virtual clock
    /// * `deliver` - Called with the scheduler and each due alarm, in order
    pub fn advance<F: FnMut(&mut Self, Alarm)>(&mut self, by: Duration, deliver: F) {
        let until = self.now + by;
        self.run_until(until, deliver);
    }

    /// Delivers every alarm due at or before `until`, then sets the clock to it
    ///
    /// Alarms scheduled from inside `deliver` are picked up in the same run
    /// if they fall due before `until`.
    pub fn run_until<F: FnMut(&mut Self, Alarm)>(&mut self, until: SystemTime, mut deliver: F) {
        while let Some(position) = self
            .tasks
            .iter()
            .position_min_by_key(|task| (task.due, task.seq))
        {
            if self.tasks[position].due > until {
                break;
            }

            let task = self.tasks.swap_remove(position);
            self.now = self.now.max(task.due);
            self.fired[task.cadence] += 1;

            if let Some(period) = task.period {
                let seq = self.bump_seq();
                self.tasks.push(Task {
                    due: task.due + period,
                    seq,
                    alarm: task.alarm.clone(),
                    ..task
                });
            }

            trace!(id = %task.id, cadence = ?task.cadence, "delivering alarm");
            deliver(self, task.alarm);
        }

        self.now = self.now.max(until);
    }

    /// Delivers every alarm that is already due without moving the clock
    pub fn run_pending<F: FnMut(&mut Self, Alarm)>(&mut self, deliver: F) {
        self.run_until(self.now, deliver);
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn push(
        &mut self,
        alarm: Alarm,
        delay: Duration,
        cadence: Cadence,
        period: Option<Duration>,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let seq = self.bump_seq();
        self.tasks.push(Task {
            id,
            due: self.now + delay,
            seq,
            cadence,
            period,
            alarm,
        });
        id
    }
}

impl Clock for ManualScheduler {
    fn now(&self) -> SystemTime {
        self.now
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_repeating(&mut self, alarm: Alarm, period: Duration) -> TimerId {
        let period = period.max(Duration::from_millis(1));
        self.push(alarm, period, Cadence::Repeating, Some(period))
    }

    fn schedule_once(&mut self, alarm: Alarm, delay: Duration) -> TimerId {
        self.push(alarm, delay, Cadence::Once, None)
    }

    fn request_frame(&mut self, alarm: Alarm) -> TimerId {
        self.push(alarm, self.frame_interval, Cadence::Frame, None)
    }

    fn cancel(&mut self, id: TimerId) {
        self.tasks.retain(|task| task.id != id);
    }
}
