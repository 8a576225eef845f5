//! Timed-choice countdown.
//!
//! ```text
//! Idle ──start──▶ Running ──tick to 0──▶ Expired   (fallback auto-selected)
//!                    │                 └▶ Stalled   (no fallback exists)
//!                    └──cancel──▶ Cancelled        (player chose manually)
//! ```
//!
//! The countdown is driven by whoever owns it calling [`Countdown::tick`]
//! once per second; it holds no timer of its own. Expiry fires exactly once.

use crate::chapter::{Chapter, Choice};
use crate::gate::find_fallback;

/// Where the countdown is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownState {
    Idle,
    Running { remaining: u32, limit: u32 },
    Expired,
    Cancelled,
    Stalled,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// The countdown isn't running; nothing happened.
    Inactive,
    /// Still counting.
    Running { remaining: u32 },
    /// Time ran out and this fallback choice was selected.
    Expired(Choice),
    /// Time ran out and there was no fallback to select.
    Stalled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    state: CountdownState,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Countdown {
    pub fn new() -> Self {
        Self {
            state: CountdownState::Idle,
        }
    }

    pub fn state(&self) -> CountdownState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, CountdownState::Running { .. })
    }

    /// Start counting down `chapter`'s time limit.
    ///
    /// Only timed chapters with a positive limit start a countdown; returns
    /// whether it is now running.
    pub fn start(&mut self, chapter: &Chapter) -> bool {
        if chapter.has_countdown() {
            self.state = CountdownState::Running {
                remaining: chapter.time_limit,
                limit: chapter.time_limit,
            };
            true
        } else {
            self.state = CountdownState::Idle;
            false
        }
    }

    /// Advance one second. On reaching zero, select the fallback from `choices`.
    pub fn tick(&mut self, choices: &[Choice]) -> Tick {
        let CountdownState::Running { remaining, limit } = self.state else {
            return Tick::Inactive;
        };

        let remaining = remaining.saturating_sub(1);
        if remaining > 0 {
            self.state = CountdownState::Running { remaining, limit };
            return Tick::Running { remaining };
        }

        match find_fallback(choices) {
            Some(choice) => {
                self.state = CountdownState::Expired;
                Tick::Expired(choice.clone())
            }
            None => {
                self.state = CountdownState::Stalled;
                Tick::Stalled
            }
        }
    }

    /// Stop a running countdown because the player chose. Returns whether it was running.
    pub fn cancel(&mut self) -> bool {
        if self.is_running() {
            self.state = CountdownState::Cancelled;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.state = CountdownState::Idle;
    }

    pub fn remaining(&self) -> Option<u32> {
        match self.state {
            CountdownState::Running { remaining, .. } => Some(remaining),
            _ => None,
        }
    }

    /// Fraction of time left, 1.0 at start down to 0.0.
    pub fn progress(&self) -> Option<f32> {
        match self.state {
            CountdownState::Running { remaining, limit } if limit > 0 => {
                Some(remaining as f32 / limit as f32)
            }
            _ => None,
        }
    }
}
