// ============================================================================
// clock.rs — lifegrid
// Free-running periodic trigger, gated on wall-clock time.
// ============================================================================

use std::time::Duration;

/// Fires at most once per evaluation when `period` has elapsed since the
/// last fire. Missed periods are not caught up.
#[derive(Clone, Debug)]
pub struct Clock {
    period: Duration,
    paused: bool,
    last_fire: Duration,
    detached: bool,
}

impl Clock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            paused: false,
            last_fire: Duration::ZERO,
            detached: false,
        }
    }

    /// Evaluate the clock at `now` (time since the loop started).
    /// Returns true when a tick fires.
    pub fn tick(&mut self, now: Duration) -> bool {
        if self.paused || self.detached {
            return false;
        }
        if now > self.last_fire + self.period {
            self.last_fire = now;
            true
        } else {
            false
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn toggle_paused(&mut self) -> bool {
        self.paused = !self.paused;
        self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Permanently silence the clock. Used at teardown.
    pub fn detach(&mut self) {
        self.detached = true;
    }
}
