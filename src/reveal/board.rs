//! Identity-keyed reveal animators for a list of siblings
//!
//! A results screen re-renders its list many times while the reveal plays.
//! The board keeps animators keyed by item identity rather than by list
//! position, so a row that moves or re-renders keeps its animation and a row
//! that disappears has its pending frames cancelled.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    hash::Hash,
};

use itertools::Itertools;
use tracing::warn;

use super::{Precision, StaggeredRevealAnimator};
use crate::{config::RevealConfig, scheduler::Scheduler};

/// Animators for every item currently on screen
///
/// Each animator gets its own slot. Slots are never reused, so alarms for a
/// removed item cannot reach the item that replaced it.
#[derive(Debug)]
pub struct RevealBoard<K> {
    config: RevealConfig,
    precision: Precision,
    animators: HashMap<u32, StaggeredRevealAnimator<K>>,
    slots: HashMap<K, u32>,
    order: Vec<K>,
    next_slot: u32,
}

impl<K> RevealBoard<K>
where
    K: Clone + Eq + Hash + Debug,
{
    /// Creates an empty board
    ///
    /// # Arguments
    ///
    /// * `precision` - Presentation of every item's intermediate values
    /// * `config` - Timing shared by every item on this screen
    pub fn new(precision: Precision, config: RevealConfig) -> Self {
        Self {
            config,
            precision,
            animators: HashMap::new(),
            slots: HashMap::new(),
            order: Vec::new(),
            next_slot: 0,
        }
    }

    /// Brings the board in line with the items currently displayed
    ///
    /// `items` are `(identity, target)` pairs in display order; an item's
    /// position becomes its ordinal. Later duplicates of an identity are
    /// ignored. Items no longer present are torn down.
    pub fn sync<I, S>(&mut self, items: I, should_animate: bool, scheduler: &mut S)
    where
        I: IntoIterator<Item = (K, f64)>,
        S: Scheduler,
    {
        let items = items
            .into_iter()
            .unique_by(|(identity, _)| identity.clone())
            .collect_vec();

        let present: HashSet<&K> = items.iter().map(|(identity, _)| identity).collect();
        let vanished = self
            .slots
            .keys()
            .filter(|identity| !present.contains(identity))
            .cloned()
            .collect_vec();

        for identity in vanished {
            if let Some(mut animator) = self
                .slots
                .remove(&identity)
                .and_then(|slot| self.animators.remove(&slot))
            {
                animator.teardown(scheduler);
            }
        }

        self.order = items.iter().map(|(identity, _)| identity.clone()).collect();

        for (ordinal, (identity, target)) in items.into_iter().enumerate() {
            let slot = self.slot_for(&identity, target, ordinal);
            if let Some(animator) = self.animators.get_mut(&slot) {
                animator.update(identity, target, ordinal, should_animate, scheduler);
            }
        }
    }

    /// Routes an alarm to the animator it belongs to
    ///
    /// # Returns
    ///
    /// `true` if an animator on this board handled the alarm
    pub fn receive_alarm<S: Scheduler>(&mut self, scheduler: &mut S, alarm: &crate::Alarm) -> bool {
        let crate::Alarm::Reveal(reveal) = alarm else {
            return false;
        };

        match self.animators.get_mut(&reveal.slot()) {
            Some(animator) => animator.receive_alarm(scheduler, alarm),
            None => {
                warn!(?reveal, "reveal alarm for an item no longer on the board");
                false
            }
        }
    }

    /// Returns the animator for `identity`
    pub fn get(&self, identity: &K) -> Option<&StaggeredRevealAnimator<K>> {
        self.slots
            .get(identity)
            .and_then(|slot| self.animators.get(slot))
    }

    /// Returns the value to display for `identity`
    pub fn current_value(&self, identity: &K) -> Option<f64> {
        self.get(identity).map(StaggeredRevealAnimator::current_value)
    }

    /// Returns each displayed identity with its current value, in display order
    pub fn values(&self) -> impl Iterator<Item = (&K, f64)> {
        self.order
            .iter()
            .filter_map(|identity| Some((identity, self.current_value(identity)?)))
    }

    /// Returns the number of items on the board
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns whether the board has no items
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns whether no item has a pending delay or frame
    pub fn is_settled(&self) -> bool {
        self.animators
            .values()
            .all(|animator| !animator.is_animating())
    }

    /// Tears down every animator and empties the board
    pub fn teardown<S: Scheduler>(&mut self, scheduler: &mut S) {
        for (_, mut animator) in self.animators.drain() {
            animator.teardown(scheduler);
        }
        self.slots.clear();
        self.order.clear();
    }

    fn slot_for(&mut self, identity: &K, target: f64, ordinal: usize) -> u32 {
        if let Some(slot) = self.slots.get(identity) {
            return *slot;
        }

        let slot = self.next_slot;
        self.next_slot += 1;
        self.animators.insert(
            slot,
            StaggeredRevealAnimator::new(identity.clone(), target, ordinal, self.precision)
                .with_config(self.config)
                .with_slot(slot),
        );
        self.slots.insert(identity.clone(), slot);
        slot
    }
}
