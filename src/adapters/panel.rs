//! Host panel adapter: lever switches and operator console.
//!
//! The host runner has no physical levers, so switch positions and
//! control commands come from a stimulus file, a JSON array of timed
//! steps:
//!
//! ```text
//! [
//!   { "at_ms": 100,  "switch": 1, "position": "down" },
//!   { "at_ms": 400,  "switch": 1, "position": "off" },
//!   { "at_ms": 1000, "command": { "cmd": "poll", "kind": "sensor", "address": 1, "ctl": 4 } }
//! ]
//! ```
//!
//! Script console output goes to any [`Write`] target (stdout in the
//! runner).

use std::io::Write;

use log::warn;
use serde::Deserialize;

use crate::app::commands::ControlCommand;
use crate::app::ports::{ConsolePort, SWITCH_COUNT, SwitchPort};
use crate::drivers::switch::SwitchPosition;

// ───────────────────────────────────────────────────────────────
// Stimulus timeline
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum StimulusStep {
    Switch {
        at_ms: u64,
        switch: u8,
        position: SwitchPosition,
    },
    Command {
        at_ms: u64,
        command: ControlCommand,
    },
}

impl StimulusStep {
    pub fn at_ms(&self) -> u64 {
        match self {
            Self::Switch { at_ms, .. } | Self::Command { at_ms, .. } => *at_ms,
        }
    }
}

/// Timed steps, replayed in time order.
#[derive(Debug, Clone, Default)]
pub struct Stimulus {
    steps: Vec<StimulusStep>,
    next: usize,
}

impl Stimulus {
    pub fn new(mut steps: Vec<StimulusStep>) -> Self {
        steps.sort_by_key(StimulusStep::at_ms);
        Self { steps, next: 0 }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text).map(Self::new)
    }

    /// Steps due at or before `now_ms` that were not returned yet.
    pub fn due(&mut self, now_ms: u64) -> &[StimulusStep] {
        let start = self.next;
        while self.steps.get(self.next).is_some_and(|s| s.at_ms() <= now_ms) {
            self.next += 1;
        }
        &self.steps[start..self.next]
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.steps.len()
    }
}

// ───────────────────────────────────────────────────────────────
// Panel
// ───────────────────────────────────────────────────────────────

pub struct HostPanel<W: Write> {
    positions: [SwitchPosition; SWITCH_COUNT as usize],
    out: W,
}

impl<W: Write> HostPanel<W> {
    pub fn new(out: W) -> Self {
        Self {
            positions: [SwitchPosition::Off; SWITCH_COUNT as usize],
            out,
        }
    }

    /// Move a lever. Returns `false` for an unknown switch.
    pub fn set_switch(&mut self, switch: u8, position: SwitchPosition) -> bool {
        match switch
            .checked_sub(1)
            .and_then(|i| self.positions.get_mut(usize::from(i)))
        {
            Some(p) => {
                *p = position;
                true
            }
            None => {
                warn!("Panel: no switch {}", switch);
                false
            }
        }
    }

    pub fn out(&self) -> &W {
        &self.out
    }
}

impl<W: Write> SwitchPort for HostPanel<W> {
    fn read_switch(&mut self, switch: u8) -> SwitchPosition {
        switch
            .checked_sub(1)
            .and_then(|i| self.positions.get(usize::from(i)))
            .copied()
            .unwrap_or(SwitchPosition::Off)
    }
}

impl<W: Write> ConsolePort for HostPanel<W> {
    fn print(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            warn!("Console output failed: {}", e);
        }
    }
}
