//! Countdown timers armed by scripts.
//!
//! Four general-purpose timers, `timer[1]`..`timer[4]`.  A timer counts
//! down monotonically; when it reaches zero it notifies the
//! [`TimerDelegate`] exactly once and disarms itself.  There is no
//! auto-repeat: a script that wants a periodic tick re-arms the timer from
//! its own expiry script.
//!
//! ```text
//!   timer[2].sec = 20 ──▶ arm(2, 20000, tmr2)
//!                              │
//!        tick(elapsed) ────────┤  remaining -= elapsed
//!                              ▼
//!                     remaining == 0 ──▶ delegate.on_timer_expired(2, tmr2)
//!                                        (slot disarmed)
//! ```

use log::debug;

use crate::app::ports::TimerDelegate;
use crate::script::ScriptBinding;

/// Number of script timers.
pub const TIMER_COUNT: usize = 4;

#[derive(Debug, Clone, PartialEq)]
struct TimerEntry {
    remaining_ms: u32,
    event: ScriptBinding,
}

#[derive(Debug, Clone, Default)]
pub struct TimerBank {
    timers: [Option<TimerEntry>; TIMER_COUNT],
}

impl TimerBank {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(id: u8) -> Option<usize> {
        (1..=TIMER_COUNT as u8)
            .contains(&id)
            .then(|| usize::from(id) - 1)
    }

    pub fn is_valid_id(id: i64) -> bool {
        u8::try_from(id).ok().and_then(Self::slot).is_some()
    }

    /// Arm timer `id` to dispatch `event` after `duration_ms`. A duration of
    /// zero cancels. Returns `false` for an unknown id.
    pub fn arm(&mut self, id: u8, duration_ms: u32, event: ScriptBinding) -> bool {
        let Some(i) = Self::slot(id) else {
            return false;
        };
        if duration_ms == 0 {
            self.timers[i] = None;
            debug!("Timer {}: cancelled", id);
        } else {
            debug!("Timer {}: armed for {}ms", id, duration_ms);
            self.timers[i] = Some(TimerEntry {
                remaining_ms: duration_ms,
                event,
            });
        }
        true
    }

    pub fn cancel(&mut self, id: u8) -> bool {
        match Self::slot(id) {
            Some(i) => {
                self.timers[i] = None;
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.timers = Default::default();
    }

    /// Milliseconds left on timer `id`; zero when disarmed.
    pub fn remaining_ms(&self, id: u8) -> u32 {
        Self::slot(id)
            .and_then(|i| self.timers[i].as_ref())
            .map_or(0, |t| t.remaining_ms)
    }

    pub fn is_armed(&self, id: u8) -> bool {
        self.remaining_ms(id) > 0
    }

    pub fn armed_count(&self) -> usize {
        self.timers.iter().filter(|t| t.is_some()).count()
    }

    /// Advance all armed timers by `elapsed_ms`, in id order.
    pub fn tick(&mut self, elapsed_ms: u32, delegate: &mut dyn TimerDelegate) {
        for (i, slot) in self.timers.iter_mut().enumerate() {
            let expired = match slot.as_mut() {
                None => continue,
                Some(entry) if entry.remaining_ms > elapsed_ms => {
                    entry.remaining_ms -= elapsed_ms;
                    false
                }
                Some(_) => true,
            };
            if expired && let Some(done) = slot.take() {
                let id = (i + 1) as u8;
                debug!("Timer {}: expired", id);
                delegate.on_timer_expired(id, done.event);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
