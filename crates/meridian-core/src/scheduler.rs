//! Timer bookkeeping for debounce, dwell and polling
//!
//! The scheduler never sleeps. It records one pending deadline per
//! [`TimerKind`] and hands back a [`TimerToken`] for every scheduling call.
//! Rescheduling a kind replaces its deadline and invalidates the previous
//! token, which is how "reset the debounce window" and "a newer status
//! supersedes the dwell" are expressed. The engine loop sleeps until
//! [`Scheduler::next_deadline`] and then drains [`Scheduler::take_due`].
//!
//! Deadlines use `tokio::time::Instant`, so tests can drive timers with a
//! paused tokio clock or with hand-built instants.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

/// What a timer is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Debounced save after a burst of mutations
    Debounce,
    /// Revert a transient status to the quiescent one
    Dwell,
    /// Periodic remote refresh or local autosave
    Poll,
}

/// Handle identifying one scheduling call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    kind: TimerKind,
    generation: u64,
}

impl TimerToken {
    pub fn kind(&self) -> TimerKind {
        self.kind
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    deadline: Instant,
    generation: u64,
}

/// One-slot-per-kind timer table
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: HashMap<TimerKind, Pending>,
    next_generation: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire at `deadline`, replacing any pending timer of that
    /// kind
    pub fn schedule_at(&mut self, kind: TimerKind, deadline: Instant) -> TimerToken {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.pending.insert(
            kind,
            Pending {
                deadline,
                generation,
            },
        );
        TimerToken { kind, generation }
    }

    /// Arm `kind` to fire `delay` after `now`
    pub fn schedule_in(&mut self, kind: TimerKind, now: Instant, delay: Duration) -> TimerToken {
        self.schedule_at(kind, now + delay)
    }

    /// Cancel the timer behind `token`
    ///
    /// Returns false if the token was already superseded, fired, or cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        if self.is_pending(token) {
            self.pending.remove(&token.kind);
            true
        } else {
            false
        }
    }

    /// Cancel whatever timer of `kind` is pending
    pub fn cancel_kind(&mut self, kind: TimerKind) -> Option<TimerToken> {
        self.pending.remove(&kind).map(|p| TimerToken {
            kind,
            generation: p.generation,
        })
    }

    /// True while `token` is the live timer of its kind
    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.pending
            .get(&token.kind)
            .is_some_and(|p| p.generation == token.generation)
    }

    /// Live token of `kind`, if one is armed
    pub fn pending(&self, kind: TimerKind) -> Option<TimerToken> {
        self.pending.get(&kind).map(|p| TimerToken {
            kind,
            generation: p.generation,
        })
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.deadline).min()
    }

    /// Remove and return every timer due at `now`, earliest first
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerToken> {
        let mut due: Vec<(Instant, TimerToken)> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline <= now)
            .map(|(&kind, p)| {
                (
                    p.deadline,
                    TimerToken {
                        kind,
                        generation: p.generation,
                    },
                )
            })
            .collect();

        due.sort_by_key(|(deadline, token)| (*deadline, token.kind));
        for (_, token) in &due {
            self.pending.remove(&token.kind);
        }
        due.into_iter().map(|(_, token)| token).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
