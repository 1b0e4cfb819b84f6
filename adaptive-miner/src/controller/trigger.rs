//! An armed-but-unconfirmed condition waiting out a debounce period.
//!
//! The adaptive controller never acts on a single reading. When a reading
//! looks bad (or good, when paused) it arms a trigger; once the debounce has
//! elapsed it takes a fresh reading and either commits the transition or
//! disarms.
//!
//! # State Machine
//!
//! ```text
//!           arm(now)                 now - since >= debounce
//!  Idle ──────────────► Armed ──────────────────────────────► Due
//!   ▲                     │                                    │
//!   │      disarm()       │        disarm() (commit or         │
//!   └─────────────────────┘         unfavorable re-check)      │
//!   ▲                                                          │
//!   └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Unlike a level-triggered alarm, the trigger does not see the condition
//! between arming and the re-check; readings in between are the caller's
//! business. Time is passed in explicitly so the controller can be driven by
//! a simulated clock.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct DebouncedTrigger {
    debounce: Duration,
    armed_at: Option<Instant>,
}

impl DebouncedTrigger {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            armed_at: None,
        }
    }

    /// Arm at `now`. Returns `false` and keeps the original timestamp if
    /// already armed.
    pub fn arm(&mut self, now: Instant) -> bool {
        if self.armed_at.is_some() {
            return false;
        }
        self.armed_at = Some(now);
        true
    }

    pub fn disarm(&mut self) {
        self.armed_at = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    pub fn armed_at(&self) -> Option<Instant> {
        self.armed_at
    }

    /// Armed and the debounce has elapsed.
    pub fn is_due(&self, now: Instant) -> bool {
        self.armed_at
            .is_some_and(|since| now.saturating_duration_since(since) >= self.debounce)
    }
}
