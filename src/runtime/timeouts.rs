use embassy_time::Instant;

use crate::processor::{TimerToken, MAX_LAYER_SLOTS};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PendingTimeout {
    token: TimerToken,
    deadline: Instant,
}

/// Auto-deactivation deadlines, at most one per layer slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeoutQueue {
    entries: [Option<PendingTimeout>; MAX_LAYER_SLOTS],
}

impl Default for TimeoutQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutQueue {
    pub const fn new() -> Self {
        Self {
            entries: [None; MAX_LAYER_SLOTS],
        }
    }

    /// Arms `token`, replacing whatever was pending for its layer.
    pub fn arm(&mut self, token: TimerToken, deadline: Instant) {
        if let Some(entry) = self.entries.get_mut(usize::from(token.layer)) {
            *entry = Some(PendingTimeout { token, deadline });
        }
    }

    /// Drops `token` if it is still the one pending for its layer.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        match self.entries.get_mut(usize::from(token.layer)) {
            Some(entry) if entry.is_some_and(|pending| pending.token == token) => {
                *entry = None;
                true
            }
            _ => false,
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries
            .iter()
            .flatten()
            .map(|pending| pending.deadline)
            .min()
    }

    /// Removes and returns the earliest timer due at `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<TimerToken> {
        let entry = self
            .entries
            .iter_mut()
            .filter(|entry| entry.is_some_and(|pending| pending.deadline <= now))
            .min_by_key(|entry| entry.map(|pending| pending.deadline))?;
        entry.take().map(|pending| pending.token)
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
