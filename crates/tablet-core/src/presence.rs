//! Presence debouncing.
//!
//! Single frames are noisy: a turned head or motion blur drops a face for a
//! tick or two. The tracker only declares [`Presence::Absent`] once no face
//! has been seen for the whole presence timeout.

use crate::types::{FaceSignal, Presence};
use std::time::{Duration, Instant};

/// Debounces per-tick face signals into stable present/absent transitions.
///
/// Starts [`Presence::Absent`] with no last sighting, so the screen stays in
/// its absent configuration until the first positive detection.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    timeout: Duration,
    state: Presence,
    last_seen: Option<Instant>,
}

impl PresenceTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            state: Presence::Absent,
            last_seen: None,
        }
    }

    pub fn state(&self) -> Presence {
        self.state
    }

    pub fn last_seen(&self) -> Option<Instant> {
        self.last_seen
    }

    /// Feed one detection tick. Returns the new state if it changed.
    pub fn observe(&mut self, signal: &FaceSignal, now: Instant) -> Option<Presence> {
        let next = if signal.seen {
            self.last_seen = Some(now);
            Presence::Present
        } else {
            match self.last_seen {
                Some(seen) if now.saturating_duration_since(seen) < self.timeout => self.state,
                _ => Presence::Absent,
            }
        };

        if next == self.state {
            return None;
        }
        self.state = next;
        Some(next)
    }

    /// Restart the debounce window, used when detection is switched back on
    /// after a pause so a stale sighting does not expire on the first tick.
    pub fn resume(&mut self, now: Instant) {
        if self.state.is_present() {
            self.last_seen = Some(now);
        }
    }
}
