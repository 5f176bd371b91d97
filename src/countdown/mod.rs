//! Server-synchronized phase countdown
//!
//! Every timed phase of a game (a question being introduced, the answering
//! window, the reveal) shows a countdown and moves on when it reaches zero.
//! [`SyncedCountdown`] is that countdown: it decrements once per second,
//! briefly reconciles against the server's phase start time when one is
//! known, and notifies its owner exactly once when the phase runs out.

pub mod sync;

use std::{fmt::Debug, time::Duration};

use derive_where::derive_where;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::{
    clock::Timestamp,
    config::CountdownConfig,
    constants,
    scheduler::{Scheduler, TimerId},
};

use sync::SyncWindow;

/// Alarm messages for countdown timers
///
/// `slot` identifies the countdown among those sharing a scheduler and
/// `generation` identifies the phase it was scheduled for. Alarms from an
/// earlier generation are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alarm {
    /// Once-per-second local decrement
    Tick {
        /// Countdown the alarm belongs to
        slot: u32,
        /// Phase generation the alarm was scheduled in
        generation: u64,
    },
    /// A future server start time has arrived and the window opens
    Open {
        /// Countdown the alarm belongs to
        slot: u32,
        /// Phase generation the alarm was scheduled in
        generation: u64,
    },
    /// Reconciliation poll inside the synchronization window
    Poll {
        /// Countdown the alarm belongs to
        slot: u32,
        /// Phase generation the alarm was scheduled in
        generation: u64,
    },
    /// Deferred expiry notification
    Expire {
        /// Countdown the alarm belongs to
        slot: u32,
        /// Phase generation the alarm was scheduled in
        generation: u64,
    },
}

impl Alarm {
    /// Returns the slot of the countdown this alarm belongs to
    pub fn slot(&self) -> u32 {
        match self {
            Self::Tick { slot, .. }
            | Self::Open { slot, .. }
            | Self::Poll { slot, .. }
            | Self::Expire { slot, .. } => *slot,
        }
    }

    /// Returns the generation this alarm was scheduled in
    pub fn generation(&self) -> u64 {
        match self {
            Self::Tick { generation, .. }
            | Self::Open { generation, .. }
            | Self::Poll { generation, .. }
            | Self::Expire { generation, .. } => *generation,
        }
    }
}

/// Renderable view of a countdown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountdownSnapshot {
    /// Seconds left to display
    pub remaining_seconds: u64,
    /// Total length of the phase
    pub duration_seconds: u64,
    /// Whether the expiry notification has been delivered
    pub has_expired: bool,
    /// Whether the countdown is currently reconciling against server time
    pub synchronizing: bool,
}

/// A once-per-second countdown for a single game phase
///
/// The countdown is keyed by a phase identity `K` (typically a question
/// id). Re-passing the same identity is treated as a re-render and leaves
/// the countdown alone; a new identity resets it.
///
/// `on_expired` is invoked with the phase identity exactly once per phase,
/// from inside [`receive_alarm`](Self::receive_alarm) and never from the
/// call that brought the countdown to zero. Panics in the callback
/// propagate to the caller of `receive_alarm`.
#[derive_where(Debug; K)]
pub struct SyncedCountdown<K, E> {
    /// Identity of the current phase
    phase: K,
    /// Total length of the current phase
    duration_seconds: u64,
    /// When the server says the phase began, if known
    server_start: Option<Timestamp>,
    /// Currently displayed value, never above `duration_seconds`
    remaining_seconds: u64,
    /// Set when the expiry notification is delivered
    has_expired: bool,
    /// Set when the expiry notification is scheduled, so it is only scheduled once
    expiry_scheduled: bool,
    /// Whether ticks or polls are active
    running: bool,
    /// Set by teardown; nothing is honored afterwards
    torn_down: bool,
    /// Open synchronization window, if reconciling
    window: Option<SyncWindow>,
    /// How long the current or last window has been reconciling
    sync_window_elapsed: Duration,

    config: CountdownConfig,
    slot: u32,
    generation: u64,
    tick_timer: Option<TimerId>,
    poll_timer: Option<TimerId>,
    expiry_timer: Option<TimerId>,
    #[derive_where(skip)]
    on_expired: E,
}

impl<K, E> SyncedCountdown<K, E>
where
    K: Clone + PartialEq + Debug,
    E: FnMut(&K),
{
    /// Creates a countdown for `phase` that has not started ticking yet
    ///
    /// # Arguments
    ///
    /// * `phase` - Identity of the phase being counted down
    /// * `duration_seconds` - Length of the phase; zero expires immediately on start
    /// * `server_start` - When the server says the phase began, if known
    /// * `on_expired` - Called once with the phase identity when time runs out
    pub fn new(
        phase: K,
        duration_seconds: u64,
        server_start: Option<Timestamp>,
        on_expired: E,
    ) -> Self {
        Self {
            phase,
            duration_seconds,
            server_start,
            remaining_seconds: duration_seconds,
            has_expired: false,
            expiry_scheduled: false,
            running: false,
            torn_down: false,
            window: None,
            sync_window_elapsed: Duration::ZERO,
            config: CountdownConfig::default(),
            slot: 0,
            generation: 0,
            tick_timer: None,
            poll_timer: None,
            expiry_timer: None,
            on_expired,
        }
    }

    /// Replaces the default reconciliation cadence
    #[must_use]
    pub fn with_config(mut self, config: CountdownConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the slot used to route this countdown's alarms
    #[must_use]
    pub fn with_slot(mut self, slot: u32) -> Self {
        self.slot = slot;
        self
    }

    /// Returns the identity of the current phase
    pub fn phase(&self) -> &K {
        &self.phase
    }

    /// Returns the length of the current phase
    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    /// Returns the seconds left to display
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining_seconds
    }

    /// Returns whether the expiry notification has been delivered
    pub fn has_expired(&self) -> bool {
        self.has_expired
    }

    /// Returns whether the countdown is ticking or reconciling
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Returns whether the countdown is inside a synchronization window
    pub fn is_synchronizing(&self) -> bool {
        self.window.is_some()
    }

    /// Returns whether the countdown has been torn down
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Returns the server start time being reconciled against, if any
    pub fn server_start(&self) -> Option<Timestamp> {
        self.server_start
    }

    /// Returns how long the current or last synchronization window has run
    pub fn sync_window_elapsed(&self) -> Duration {
        self.sync_window_elapsed
    }

    /// Returns a renderable view of the countdown
    pub fn snapshot(&self) -> CountdownSnapshot {
        CountdownSnapshot {
            remaining_seconds: self.remaining_seconds,
            duration_seconds: self.duration_seconds,
            has_expired: self.has_expired,
            synchronizing: self.is_synchronizing(),
        }
    }

    /// Starts counting down
    ///
    /// With a known server start time the countdown reconciles immediately
    /// and keeps polling for the synchronization window; otherwise it ticks
    /// locally. A server start still in the future holds the full duration
    /// with a single alarm and only starts polling once it arrives. A zero-length phase schedules its expiry without ever
    /// entering the running state. Calling `start` on a running, expired or
    /// torn-down countdown does nothing.
    pub fn start<S: Scheduler>(&mut self, scheduler: &mut S) {
        if self.torn_down || self.running || self.expiry_scheduled {
            return;
        }

        debug!(
            phase = ?self.phase,
            duration = self.duration_seconds,
            server_start = ?self.server_start,
            "starting countdown"
        );

        if self.duration_seconds == 0 {
            self.remaining_seconds = 0;
            self.schedule_expiry(scheduler);
            return;
        }

        self.running = true;
        match self.server_start {
            Some(server_start) => self.open_window(server_start, scheduler),
            None => self.start_ticking(scheduler),
        }
    }

    /// Applies the phase inputs passed in by the owning screen
    ///
    /// A new phase identity resets the countdown completely and starts it.
    /// The same identity with a different duration resets it in place (see
    /// [`set_duration`](Self::set_duration)). Otherwise only a newly known
    /// server start time is taken into account.
    pub fn reset<S: Scheduler>(
        &mut self,
        phase: K,
        duration_seconds: u64,
        server_start: Option<Timestamp>,
        scheduler: &mut S,
    ) {
        if self.torn_down {
            debug!(phase = ?phase, "ignoring reset of torn down countdown");
            return;
        }

        if phase != self.phase {
            debug!(from = ?self.phase, to = ?phase, "new phase, resetting countdown");
            self.phase = phase;
            self.rearm(duration_seconds, server_start, scheduler);
            self.start(scheduler);
        } else if duration_seconds != self.duration_seconds {
            if server_start.is_some() {
                self.server_start = server_start;
            }
            self.set_duration(duration_seconds, scheduler);
        } else if let Some(server_start) = server_start {
            self.observe_server_start(server_start, scheduler);
        }
    }

    /// Changes the phase length without changing the phase identity
    ///
    /// The countdown restarts from the new duration. Once the phase has
    /// reached zero the expiry stays latched and only the stored duration
    /// changes.
    pub fn set_duration<S: Scheduler>(&mut self, duration_seconds: u64, scheduler: &mut S) {
        if self.torn_down || duration_seconds == self.duration_seconds {
            return;
        }

        if self.expiry_scheduled {
            self.duration_seconds = duration_seconds;
            return;
        }

        debug!(
            phase = ?self.phase,
            from = self.duration_seconds,
            to = duration_seconds,
            "changing countdown duration"
        );

        let was_running = self.running;
        self.rearm(duration_seconds, self.server_start, scheduler);
        if was_running {
            self.start(scheduler);
        }
    }

    /// Takes a server start time into account
    ///
    /// The synchronization window opens at the later of now and the server
    /// start, even when the time arrives long after the countdown started. Re-announcing the same time is a
    /// no-op.
    pub fn observe_server_start<S: Scheduler>(
        &mut self,
        server_start: Timestamp,
        scheduler: &mut S,
    ) {
        if self.torn_down || self.expiry_scheduled || self.server_start == Some(server_start) {
            return;
        }

        debug!(phase = ?self.phase, %server_start, "server start time observed");
        self.server_start = Some(server_start);

        if self.running {
            self.open_window(server_start, scheduler);
        }
    }

    /// Takes a raw epoch millisecond value from the wire into account
    ///
    /// Missing or invalid values leave the countdown ticking locally.
    pub fn observe_raw_server_start<S: Scheduler>(
        &mut self,
        server_start: Option<i64>,
        scheduler: &mut S,
    ) {
        match server_start.map(Timestamp::try_from) {
            Some(Ok(server_start)) => self.observe_server_start(server_start, scheduler),
            Some(Err(e)) => warn!(phase = ?self.phase, %e, "ignoring server start time"),
            None => (),
        }
    }

    /// Stops the countdown for good
    ///
    /// All pending timers are cancelled and no later alarm is honored, so a
    /// torn-down countdown never reports expiry. Tearing down twice is a
    /// no-op.
    pub fn teardown<S: Scheduler>(&mut self, scheduler: &mut S) {
        if self.torn_down {
            return;
        }

        debug!(phase = ?self.phase, remaining = self.remaining_seconds, "tearing down countdown");
        self.cancel_timers(scheduler);
        self.generation += 1;
        self.torn_down = true;
        self.running = false;
        self.window = None;
    }

    /// Handles an alarm delivered by the scheduler
    ///
    /// # Returns
    ///
    /// `true` if the alarm belonged to this countdown's current phase,
    /// `false` if it was for another countdown or is stale
    pub fn receive_alarm<S: Scheduler>(&mut self, scheduler: &mut S, alarm: &crate::Alarm) -> bool {
        let crate::Alarm::Countdown(alarm) = alarm else {
            return false;
        };

        if self.torn_down || alarm.slot() != self.slot || alarm.generation() != self.generation {
            trace!(?alarm, generation = self.generation, "ignoring stale countdown alarm");
            return false;
        }

        match alarm {
            Alarm::Tick { .. } => {
                if self.running && self.window.is_none() {
                    self.tick(scheduler);
                }
            }
            Alarm::Open { .. } => {
                self.poll_timer = None;
                if self.running {
                    self.begin_polling(scheduler);
                }
            }
            Alarm::Poll { .. } => {
                if self.running {
                    self.poll(scheduler);
                }
            }
            Alarm::Expire { .. } => self.notify_expired(),
        }

        true
    }

    fn rearm<S: Scheduler>(
        &mut self,
        duration_seconds: u64,
        server_start: Option<Timestamp>,
        scheduler: &mut S,
    ) {
        self.cancel_timers(scheduler);
        self.generation += 1;
        self.duration_seconds = duration_seconds;
        self.server_start = server_start;
        self.remaining_seconds = duration_seconds;
        self.has_expired = false;
        self.expiry_scheduled = false;
        self.running = false;
        self.window = None;
        self.sync_window_elapsed = Duration::ZERO;
    }

    fn start_ticking<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.tick_timer = Some(scheduler.schedule_repeating(
            Alarm::Tick {
                slot: self.slot,
                generation: self.generation,
            }
            .into(),
            Duration::from_millis(constants::countdown::TICK_INTERVAL_MS),
        ));
    }

    fn open_window<S: Scheduler>(&mut self, server_start: Timestamp, scheduler: &mut S) {
        for timer in [self.tick_timer.take(), self.poll_timer.take()]
            .into_iter()
            .flatten()
        {
            scheduler.cancel(timer);
        }

        self.window = Some(SyncWindow::open(
            server_start,
            scheduler.now(),
            self.config.sync_window(),
        ));
        self.sync_window_elapsed = Duration::ZERO;

        let lead_time = sync::lead_time(server_start, scheduler.now());
        if lead_time.is_zero() {
            self.begin_polling(scheduler);
            return;
        }

        // Clamped at the full duration until the server start arrives.
        self.reconcile(scheduler);
        trace!(phase = ?self.phase, ?lead_time, "waiting for server start");
        self.poll_timer = Some(scheduler.schedule_once(
            Alarm::Open {
                slot: self.slot,
                generation: self.generation,
            }
            .into(),
            lead_time,
        ));
    }

    fn begin_polling<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.reconcile(scheduler);
        if !self.running {
            return;
        }

        if self.window_closed(scheduler) {
            self.close_window(scheduler);
        } else {
            self.poll_timer = Some(scheduler.schedule_repeating(
                Alarm::Poll {
                    slot: self.slot,
                    generation: self.generation,
                }
                .into(),
                self.config.sync_poll_interval(),
            ));
        }
    }

    fn window_closed<S: Scheduler>(&self, scheduler: &S) -> bool {
        self.window
            .is_none_or(|window| window.is_closed(scheduler.now()))
    }

    fn close_window<S: Scheduler>(&mut self, scheduler: &mut S) {
        if let Some(timer) = self.poll_timer.take() {
            scheduler.cancel(timer);
        }
        self.window = None;
        debug!(
            phase = ?self.phase,
            remaining = self.remaining_seconds,
            elapsed = ?self.sync_window_elapsed,
            "synchronization window closed"
        );
        self.start_ticking(scheduler);
    }

    fn reconcile<S: Scheduler>(&mut self, scheduler: &mut S) {
        let Some(window) = self.window else {
            return;
        };

        let now = scheduler.now();
        self.sync_window_elapsed = window.elapsed(now);

        let reconciled =
            sync::reconciled_remaining(self.duration_seconds, window.server_start(), now);
        if reconciled < self.remaining_seconds {
            trace!(
                phase = ?self.phase,
                from = self.remaining_seconds,
                to = reconciled,
                "reconciled countdown"
            );
            self.remaining_seconds = reconciled;
        }

        if self.remaining_seconds == 0 {
            self.finish(scheduler);
        }
    }

    fn poll<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.reconcile(scheduler);
        if self.running && self.window_closed(scheduler) {
            self.close_window(scheduler);
        }
    }

    fn tick<S: Scheduler>(&mut self, scheduler: &mut S) {
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1);
        trace!(phase = ?self.phase, remaining = self.remaining_seconds, "countdown tick");

        if self.remaining_seconds == 0 {
            self.finish(scheduler);
        }
    }

    fn finish<S: Scheduler>(&mut self, scheduler: &mut S) {
        for timer in [self.tick_timer.take(), self.poll_timer.take()]
            .into_iter()
            .flatten()
        {
            scheduler.cancel(timer);
        }
        self.running = false;
        self.window = None;
        self.schedule_expiry(scheduler);
    }

    fn schedule_expiry<S: Scheduler>(&mut self, scheduler: &mut S) {
        if self.expiry_scheduled {
            return;
        }

        self.expiry_scheduled = true;
        self.expiry_timer = Some(scheduler.schedule_once(
            Alarm::Expire {
                slot: self.slot,
                generation: self.generation,
            }
            .into(),
            Duration::ZERO,
        ));
    }

    fn notify_expired(&mut self) {
        self.expiry_timer = None;
        if self.has_expired {
            return;
        }

        self.has_expired = true;
        debug!(phase = ?self.phase, "countdown expired");
        (self.on_expired)(&self.phase);
    }

    fn cancel_timers<S: Scheduler>(&mut self, scheduler: &mut S) {
        for timer in [
            self.tick_timer.take(),
            self.poll_timer.take(),
            self.expiry_timer.take(),
        ]
        .into_iter()
        .flatten()
        {
            scheduler.cancel(timer);
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use web_time::SystemTime;

    use super::*;
    use crate::{clock::Clock, scheduler::ManualScheduler};

    type Expiries = Rc<RefCell<Vec<&'static str>>>;

    fn epoch() -> SystemTime {
        Timestamp::from_millis(1_700_000_000_000).to_system_time()
    }

    fn server_start_offset(scheduler: &ManualScheduler, millis: i64) -> Timestamp {
        let now = Timestamp::from_system_time(scheduler.now()).as_millis();
        Timestamp::from_millis(now.saturating_add_signed(millis))
    }

    fn countdown(
        phase: &'static str,
        duration_seconds: u64,
        server_start: Option<Timestamp>,
    ) -> (
        SyncedCountdown<&'static str, impl FnMut(&&'static str)>,
        Expiries,
    ) {
        let expiries: Expiries = Rc::default();
        let sink = Rc::clone(&expiries);
        let countdown = SyncedCountdown::new(phase, duration_seconds, server_start, move |p| {
            sink.borrow_mut().push(*p);
        });
        (countdown, expiries)
    }

    /// Advances the scheduler, returning `remaining_seconds` after each delivered alarm
    fn drive<E: FnMut(&&'static str)>(
        countdown: &mut SyncedCountdown<&'static str, E>,
        scheduler: &mut ManualScheduler,
        by: Duration,
    ) -> Vec<u64> {
        let mut observed = Vec::new();
        scheduler.advance(by, |s, alarm| {
            countdown.receive_alarm(s, &alarm);
            observed.push(countdown.remaining_seconds());
        });
        observed
    }

    #[test]
    fn test_local_countdown_expires_once() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q1", 5, None);
        countdown.start(&mut scheduler);
        assert_eq!(countdown.remaining_seconds(), 5);
        assert!(countdown.is_running());

        drive(&mut countdown, &mut scheduler, Duration::from_secs(5));
        assert_eq!(countdown.remaining_seconds(), 0);
        assert!(countdown.has_expired());
        assert_eq!(*expiries.borrow(), vec!["q1"]);

        drive(&mut countdown, &mut scheduler, Duration::from_secs(1));
        assert_eq!(countdown.remaining_seconds(), 0);
        assert_eq!(expiries.borrow().len(), 1);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_remaining_is_non_increasing() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, -1500);
        let (mut countdown, _) = countdown("q", 8, Some(start));
        countdown.start(&mut scheduler);

        let observed = drive(&mut countdown, &mut scheduler, Duration::from_secs(10));
        assert!(!observed.is_empty());
        assert!(observed.windows(2).all(|pair| pair[0] >= pair[1]));
        assert_eq!(observed.last(), Some(&0));
    }

    #[test]
    fn test_expiry_is_deferred_past_the_zero_update() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q", 2, None);
        countdown.start(&mut scheduler);

        let mut expiries_when_zero_first_seen = None;
        scheduler.advance(Duration::from_secs(3), |s, alarm| {
            countdown.receive_alarm(s, &alarm);
            if countdown.remaining_seconds() == 0 && expiries_when_zero_first_seen.is_none() {
                expiries_when_zero_first_seen = Some(expiries.borrow().len());
            }
        });

        assert_eq!(expiries_when_zero_first_seen, Some(0));
        assert_eq!(expiries.borrow().len(), 1);
    }

    #[test]
    fn test_zero_duration_expires_on_next_turn() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("instant", 0, None);
        countdown.start(&mut scheduler);

        assert!(!countdown.is_running());
        assert_eq!(countdown.remaining_seconds(), 0);
        assert!(expiries.borrow().is_empty());

        scheduler.run_pending(|s, alarm| {
            countdown.receive_alarm(s, &alarm);
        });
        assert_eq!(*expiries.borrow(), vec!["instant"]);
        assert!(countdown.has_expired());
    }

    #[test]
    fn test_reconciles_late_attachment() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, -4000);
        let (mut countdown, _) = countdown("q", 10, Some(start));
        countdown.start(&mut scheduler);

        assert_eq!(countdown.remaining_seconds(), 6);
        assert!(countdown.is_synchronizing());

        drive(&mut countdown, &mut scheduler, Duration::from_millis(1999));
        assert!(countdown.is_synchronizing());
        assert_eq!(countdown.remaining_seconds(), 5);

        drive(&mut countdown, &mut scheduler, Duration::from_millis(1));
        assert!(!countdown.is_synchronizing());
        assert_eq!(countdown.remaining_seconds(), 4);
        assert_eq!(countdown.sync_window_elapsed(), Duration::from_secs(2));

        drive(&mut countdown, &mut scheduler, Duration::from_secs(1));
        assert_eq!(countdown.remaining_seconds(), 3);
    }

    #[test]
    fn test_polling_is_bounded_to_the_window() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, -1000);
        let (mut countdown, _) = countdown("q", 30, Some(start));
        countdown.start(&mut scheduler);

        drive(&mut countdown, &mut scheduler, Duration::from_secs(10));
        assert_eq!(
            scheduler.fired(crate::scheduler::Cadence::Repeating),
            20 + 8,
            "20 polls in the window, then one tick per second"
        );
        assert_eq!(countdown.remaining_seconds(), 30 - 3 - 8);
    }

    #[test]
    fn test_future_start_is_clamped() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, 5000);
        let (mut countdown, expiries) = countdown("q", 10, Some(start));
        countdown.start(&mut scheduler);

        let observed = drive(&mut countdown, &mut scheduler, Duration::from_millis(5999));
        assert!(observed.iter().all(|remaining| *remaining == 10));
        assert!(countdown.is_synchronizing());

        drive(&mut countdown, &mut scheduler, Duration::from_millis(1));
        assert_eq!(countdown.remaining_seconds(), 9);

        drive(&mut countdown, &mut scheduler, Duration::from_secs(20));
        assert_eq!(countdown.remaining_seconds(), 0);
        assert_eq!(expiries.borrow().len(), 1);
    }

    #[test]
    fn test_start_already_past_expires_immediately() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, -12_000);
        let (mut countdown, expiries) = countdown("q2", 10, Some(start));
        countdown.start(&mut scheduler);

        assert_eq!(countdown.remaining_seconds(), 0);
        assert!(!countdown.is_running());
        assert!(expiries.borrow().is_empty());

        scheduler.run_pending(|s, alarm| {
            countdown.receive_alarm(s, &alarm);
        });
        assert_eq!(*expiries.borrow(), vec!["q2"]);
        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_teardown_stops_all_updates() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q", 5, None);
        countdown.start(&mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(2));
        assert_eq!(countdown.remaining_seconds(), 3);

        countdown.teardown(&mut scheduler);
        countdown.teardown(&mut scheduler);
        assert_eq!(scheduler.pending(), 0);

        let mut delivered = 0;
        scheduler.advance(Duration::from_secs(10), |s, alarm| {
            delivered += 1;
            countdown.receive_alarm(s, &alarm);
        });
        assert_eq!(delivered, 0);
        assert_eq!(countdown.remaining_seconds(), 3);
        assert!(expiries.borrow().is_empty());
        assert!(countdown.is_torn_down());
    }

    #[test]
    fn test_teardown_between_zero_and_notification() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q", 0, None);
        countdown.start(&mut scheduler);
        countdown.teardown(&mut scheduler);

        scheduler.run_pending(|s, alarm| {
            countdown.receive_alarm(s, &alarm);
        });
        assert!(expiries.borrow().is_empty());
        assert!(!countdown.has_expired());
    }

    #[test]
    fn test_stale_alarm_is_ignored() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q", 1, None);
        countdown.start(&mut scheduler);

        let stale: crate::Alarm = Alarm::Expire {
            slot: 0,
            generation: 41,
        }
        .into();
        assert!(!countdown.receive_alarm(&mut scheduler, &stale));

        let other_slot: crate::Alarm = Alarm::Tick {
            slot: 9,
            generation: 0,
        }
        .into();
        assert!(!countdown.receive_alarm(&mut scheduler, &other_slot));
        assert_eq!(countdown.remaining_seconds(), 1);
        assert!(expiries.borrow().is_empty());
    }

    #[test]
    fn test_new_phase_resets_and_rearms_expiry() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q1", 2, None);
        countdown.start(&mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(3));
        assert!(countdown.has_expired());

        countdown.reset("q2", 3, None, &mut scheduler);
        assert_eq!(countdown.phase(), &"q2");
        assert_eq!(countdown.remaining_seconds(), 3);
        assert!(!countdown.has_expired());
        assert!(countdown.is_running());

        drive(&mut countdown, &mut scheduler, Duration::from_secs(4));
        assert_eq!(*expiries.borrow(), vec!["q1", "q2"]);
    }

    #[test]
    fn test_new_phase_mid_countdown_drops_old_timers() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q1", 3, None);
        countdown.start(&mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_millis(2500));
        assert_eq!(countdown.remaining_seconds(), 1);

        countdown.reset("q2", 5, None, &mut scheduler);
        assert_eq!(scheduler.pending(), 1);

        drive(&mut countdown, &mut scheduler, Duration::from_millis(600));
        assert_eq!(countdown.remaining_seconds(), 5);
        drive(&mut countdown, &mut scheduler, Duration::from_millis(400));
        assert_eq!(countdown.remaining_seconds(), 4);
        assert!(expiries.borrow().is_empty());
    }

    #[test]
    fn test_same_inputs_are_a_rerender() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, _) = countdown("q", 10, None);
        countdown.start(&mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(3));

        countdown.reset("q", 10, None, &mut scheduler);
        countdown.start(&mut scheduler);
        assert_eq!(countdown.remaining_seconds(), 7);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_duration_change_resets_in_place() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q", 10, None);
        countdown.start(&mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(4));

        countdown.reset("q", 20, None, &mut scheduler);
        assert_eq!(countdown.phase(), &"q");
        assert_eq!(countdown.remaining_seconds(), 20);
        assert_eq!(countdown.duration_seconds(), 20);

        drive(&mut countdown, &mut scheduler, Duration::from_secs(20));
        assert_eq!(expiries.borrow().len(), 1);
    }

    #[test]
    fn test_duration_change_after_expiry_stays_latched() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, expiries) = countdown("q", 1, None);
        countdown.start(&mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(1));
        assert!(countdown.has_expired());

        countdown.set_duration(5, &mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(10));
        assert_eq!(countdown.remaining_seconds(), 0);
        assert_eq!(countdown.duration_seconds(), 5);
        assert_eq!(expiries.borrow().len(), 1);
    }

    #[test]
    fn test_server_start_arriving_late_opens_window() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, -5000);
        let (mut countdown, _) = countdown("q", 10, None);
        countdown.start(&mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(1));
        assert_eq!(countdown.remaining_seconds(), 9);

        countdown.reset("q", 10, Some(start), &mut scheduler);
        assert!(countdown.is_synchronizing());
        assert_eq!(countdown.remaining_seconds(), 4);
        assert_eq!(countdown.server_start(), Some(start));

        countdown.observe_server_start(start, &mut scheduler);
        assert_eq!(scheduler.pending(), 1);
    }

    #[test]
    fn test_invalid_raw_server_start_falls_back_to_local() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, _) = countdown("q", 10, None);
        countdown.start(&mut scheduler);

        countdown.observe_raw_server_start(Some(-1), &mut scheduler);
        countdown.observe_raw_server_start(None, &mut scheduler);
        assert!(!countdown.is_synchronizing());
        assert_eq!(countdown.server_start(), None);

        drive(&mut countdown, &mut scheduler, Duration::from_secs(2));
        assert_eq!(countdown.remaining_seconds(), 8);
    }

    #[test]
    fn test_valid_raw_server_start_is_used() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, -3000);
        let (mut countdown, _) = countdown("q", 10, None);
        countdown.start(&mut scheduler);

        countdown.observe_raw_server_start(
            Some(i64::try_from(start.as_millis()).unwrap()),
            &mut scheduler,
        );
        assert_eq!(countdown.remaining_seconds(), 7);
    }

    #[test]
    fn test_slots_route_alarms() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (first, _) = countdown("a", 2, None);
        let (second, _) = countdown("b", 4, None);
        let mut first = first.with_slot(1);
        let mut second = second.with_slot(2);
        first.start(&mut scheduler);
        second.start(&mut scheduler);

        scheduler.advance(Duration::from_secs(1), |s, alarm| {
            let handled = first.receive_alarm(s, &alarm) | second.receive_alarm(s, &alarm);
            assert!(handled);
        });
        assert_eq!(first.remaining_seconds(), 1);
        assert_eq!(second.remaining_seconds(), 3);
    }

    #[test]
    fn test_custom_cadence() {
        let mut scheduler = ManualScheduler::new(epoch());
        let config = CountdownConfig::new(Duration::ZERO, Duration::from_millis(50)).unwrap();
        let start = server_start_offset(&scheduler, -2000);
        let (countdown, _) = countdown("q", 10, Some(start));
        let mut countdown = countdown.with_config(config);
        countdown.start(&mut scheduler);

        assert_eq!(countdown.remaining_seconds(), 8);
        assert!(!countdown.is_synchronizing());

        drive(&mut countdown, &mut scheduler, Duration::from_millis(999));
        assert_eq!(countdown.remaining_seconds(), 8);
        drive(&mut countdown, &mut scheduler, Duration::from_millis(1));
        assert_eq!(countdown.remaining_seconds(), 7);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(3));
        assert_eq!(countdown.remaining_seconds(), 4);
    }

    #[test]
    fn test_fast_polling_keeps_one_second_decrements() {
        let mut scheduler = ManualScheduler::new(epoch());
        let config = CountdownConfig::new(Duration::from_secs(2), Duration::from_millis(10)).unwrap();
        let start = server_start_offset(&scheduler, 0);
        let (countdown, _) = countdown("q", 10, Some(start));
        let mut countdown = countdown.with_config(config);
        countdown.start(&mut scheduler);

        drive(&mut countdown, &mut scheduler, Duration::from_secs(1));
        assert_eq!(countdown.remaining_seconds(), 9);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(4));
        assert_eq!(countdown.remaining_seconds(), 5);
    }

    #[test]
    fn test_distant_future_start_does_not_poll_during_lead_time() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, 3_600_000);
        let (mut countdown, expiries) = countdown("q", 30, Some(start));
        countdown.start(&mut scheduler);
        assert_eq!(scheduler.pending(), 1);

        drive(&mut countdown, &mut scheduler, Duration::from_secs(600));
        assert_eq!(scheduler.fired(crate::scheduler::Cadence::Repeating), 0);
        assert_eq!(countdown.remaining_seconds(), 30);
        assert!(countdown.is_synchronizing());

        drive(&mut countdown, &mut scheduler, Duration::from_secs(3000));
        assert_eq!(scheduler.fired(crate::scheduler::Cadence::Once), 1);
        assert_eq!(countdown.remaining_seconds(), 30);

        drive(&mut countdown, &mut scheduler, Duration::from_secs(2));
        assert_eq!(scheduler.fired(crate::scheduler::Cadence::Repeating), 20);
        assert!(!countdown.is_synchronizing());
        assert_eq!(countdown.remaining_seconds(), 28);
        assert!(expiries.borrow().is_empty());
    }

    #[test]
    fn test_teardown_during_lead_time_cancels_window() {
        let mut scheduler = ManualScheduler::new(epoch());
        let start = server_start_offset(&scheduler, 5000);
        let (mut countdown, _) = countdown("q", 10, Some(start));
        countdown.start(&mut scheduler);
        countdown.teardown(&mut scheduler);

        assert_eq!(scheduler.pending(), 0);
    }

    #[test]
    fn test_late_server_start_never_raises_remaining() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, _) = countdown("q", 10, None);
        countdown.start(&mut scheduler);
        drive(&mut countdown, &mut scheduler, Duration::from_secs(5));
        assert_eq!(countdown.remaining_seconds(), 5);

        let start = server_start_offset(&scheduler, -1000);
        countdown.observe_server_start(start, &mut scheduler);
        assert_eq!(countdown.remaining_seconds(), 5);
        assert!(countdown.is_synchronizing());

        let observed = drive(&mut countdown, &mut scheduler, Duration::from_secs(4));
        assert!(observed.iter().all(|remaining| *remaining <= 5));
        assert!(observed.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn test_snapshot_serialization() {
        let mut scheduler = ManualScheduler::new(epoch());
        let (mut countdown, _) = countdown("q", 3, None);
        countdown.start(&mut scheduler);

        let snapshot = countdown.snapshot();
        assert_eq!(
            snapshot,
            CountdownSnapshot {
                remaining_seconds: 3,
                duration_seconds: 3,
                has_expired: false,
                synchronizing: false,
            }
        );
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"remaining_seconds\":3"));
    }
}
