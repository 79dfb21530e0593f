//! Debounced three-position switch (`Up` / `Off` / `Down`).
//!
//! The scheduler samples the raw lever position once per cycle and feeds
//! it to [`SwitchDebouncer::update`].  A new position must stay stable for
//! the debounce window before it is accepted; acceptance is the edge, and
//! it is reported exactly once.  Holding a position never re-reports it.
//!
//! ```text
//!   Stable(Off) ──raw=Up──▶ Settling{Up, since} ──held ≥ debounce──▶ Stable(Up)  => edge "up"
//!        ▲                        │
//!        └────── raw=Off ─────────┘   (bounce back: no edge)
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchPosition {
    Up,
    Off,
    Down,
}

impl SwitchPosition {
    pub fn name(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Off => "off",
            Self::Down => "down",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "up" => Some(Self::Up),
            "off" => Some(Self::Off),
            "down" => Some(Self::Down),
            _ => None,
        }
    }
}

impl core::fmt::Display for SwitchPosition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Stable,
    Settling { candidate: SwitchPosition, since_ms: u64 },
}

#[derive(Debug, Clone)]
pub struct SwitchDebouncer {
    stable: SwitchPosition,
    state: DebounceState,
    debounce_ms: u32,
}

impl SwitchDebouncer {
    /// A switch resting in `Off`.
    pub fn new(debounce_ms: u32) -> Self {
        Self {
            stable: SwitchPosition::Off,
            state: DebounceState::Stable,
            debounce_ms,
        }
    }

    pub fn position(&self) -> SwitchPosition {
        self.stable
    }

    /// Feed one raw sample taken at `now_ms`. Returns the newly accepted
    /// position on an edge.
    pub fn update(&mut self, raw: SwitchPosition, now_ms: u64) -> Option<SwitchPosition> {
        if raw == self.stable {
            self.state = DebounceState::Stable;
            return None;
        }
        let since_ms = match self.state {
            DebounceState::Settling { candidate, since_ms } if candidate == raw => since_ms,
            _ => {
                self.state = DebounceState::Settling {
                    candidate: raw,
                    since_ms: now_ms,
                };
                now_ms
            }
        };
        if now_ms.saturating_sub(since_ms) >= u64::from(self.debounce_ms) {
            self.stable = raw;
            self.state = DebounceState::Stable;
            Some(raw)
        } else {
            None
        }
    }
}
