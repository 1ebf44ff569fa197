//! Rising-edge detection with retrigger cooldown
//!
//! The debouncer watches a single GPI channel. A trigger fires when that
//! channel goes from low to high and at least the cooldown has elapsed since
//! the previous trigger. The only stored state is the last seen channel levels
//! and the time of the last trigger; everything else is recomputed per frame.
//!
//! Two entry points share one evaluation:
//! - [`EdgeDebouncer::apply`] for real frames: may fire, updates state
//! - [`EdgeDebouncer::preview`] for status refresh: never fires, never mutates

use std::fmt;
use std::time::{Duration, Instant};

use crate::packet::{ChannelStates, DeviceSnapshot};

/// What the gateway reads from configuration on every evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerPolicy {
    /// Monitored channel, 0-based
    pub channel: usize,
    /// Minimum time between two triggers
    pub cooldown: Duration,
}

/// Outcome of evaluating one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Snapshot has no channel data
    NoOp,
    /// Send the trigger
    Fire,
    /// Show the levels, with a countdown if the cooldown is still running
    Display(Option<CooldownNotice>),
}

/// Time left before the next trigger is allowed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownNotice {
    pub remaining: Duration,
}

impl CooldownNotice {
    /// Remaining time rounded up to whole seconds
    pub fn remaining_secs(&self) -> u64 {
        let secs = self.remaining.as_secs();
        if self.remaining.subsec_nanos() > 0 {
            secs.saturating_add(1)
        } else {
            secs
        }
    }
}

impl fmt::Display for CooldownNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Must wait {} seconds before triggering again.",
            self.remaining_secs()
        )
    }
}

/// Edge detector and cooldown window for the monitored channel
#[derive(Debug, Default)]
pub struct EdgeDebouncer {
    /// Levels from the last applied snapshot; `None` until the first one
    previous: Option<ChannelStates>,
    /// When the last trigger fired
    last_trigger: Option<Instant>,
}

impl EdgeDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate a received snapshot
    ///
    /// On [`Action::Fire`] the trigger time is recorded before returning, so
    /// the caller dispatches against an already-closed cooldown window. The
    /// channel levels are stored whatever the outcome.
    pub fn apply(&mut self, snapshot: &DeviceSnapshot, policy: &TriggerPolicy, now: Instant) -> Action {
        let action = self.evaluate(snapshot, policy, now, true);

        if action == Action::Fire {
            self.last_trigger = Some(now);
        }
        if let Some(channels) = snapshot.channels {
            self.previous = Some(channels);
        }

        action
    }

    /// Evaluate for display only; never returns [`Action::Fire`]
    pub fn preview(&self, snapshot: &DeviceSnapshot, policy: &TriggerPolicy, now: Instant) -> Action {
        self.evaluate(snapshot, policy, now, false)
    }

    fn evaluate(
        &self,
        snapshot: &DeviceSnapshot,
        policy: &TriggerPolicy,
        now: Instant,
        mutating: bool,
    ) -> Action {
        let Some(channels) = snapshot.channels else {
            return Action::NoOp;
        };

        let notice = self.remaining(policy, now).map(|remaining| CooldownNotice { remaining });

        // No baseline yet: a channel that is already high is not an edge
        let rising = self
            .previous
            .is_some_and(|prev| !prev.get(policy.channel) && channels.get(policy.channel));

        if mutating && rising && notice.is_none() {
            Action::Fire
        } else {
            Action::Display(notice)
        }
    }

    /// Cooldown left at `now`, `None` once it has elapsed
    pub fn remaining(&self, policy: &TriggerPolicy, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(self.last_trigger?);
        policy
            .cooldown
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    /// Whether a trigger fired within the cooldown plus one second
    ///
    /// The status line keeps refreshing during that window so the countdown
    /// reaches zero on screen.
    pub fn recently_fired(&self, policy: &TriggerPolicy, now: Instant) -> bool {
        self.last_trigger.is_some_and(|last| {
            now.saturating_duration_since(last) <= policy.cooldown.saturating_add(Duration::from_secs(1))
        })
    }

    pub fn last_trigger(&self) -> Option<Instant> {
        self.last_trigger
    }

    pub fn previous_levels(&self) -> Option<ChannelStates> {
        self.previous
    }
}
