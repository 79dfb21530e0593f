//! Pulse-width codec.
//!
//! A device answers a poll with up to five timed pulses.  The width at the
//! model's condition slot (normally `pw4`) selects an entry of the
//! condition table, and the lookup windows turn that entry index into a
//! [`Condition`]:
//!
//! ```text
//!   width ──▶ table.find() ──▶ index ──▶ classify() ──▶ Condition
//!                                         │
//!              index 1 ───────────────────┼──▶ Normal
//!              tst window ────────────────┼──▶ RemoteTest
//!              alm window ────────────────┼──▶ Alarm(level)
//!              tbl window ────────────────┴──▶ Trouble(level)
//! ```
//!
//! Encoding walks the same path backwards: condition → window index →
//! representative width.  Slots a model does not drive stay `0` and are
//! never evaluated.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::catalog::{ConditionLookup, DeviceModel, PW_SLOTS};
use crate::error::DecodeError;

/// Widths of one device answer, `pw1`..`pw5`. Zero means "not driven".
pub type Pulses = [u16; PW_SLOTS];

/// Highest trouble/alarm level a device carries.
pub const MAX_LEVEL: u8 = 15;

/// Discrete device condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Condition {
    Normal,
    Trouble(u8),
    Alarm(u8),
    RemoteTest,
    /// Table entry that no lookup window covers (1-based index).
    Unclassified(u8),
}

impl core::fmt::Display for Condition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Trouble(l) => write!(f, "trouble({l})"),
            Self::Alarm(l) => write!(f, "alarm({l})"),
            Self::RemoteTest => write!(f, "remote-test"),
            Self::Unclassified(i) => write!(f, "unclassified({i})"),
        }
    }
}

/// Per-instance adjustments applied when synthesising pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseOverrides {
    /// Timing bias in percent; 100 leaves widths untouched.
    pub bias_pct: u8,
    /// Fixed widths for slots other than the condition slot.
    pub pw: [Option<u16>; PW_SLOTS],
}

impl Default for PulseOverrides {
    fn default() -> Self {
        Self {
            bias_pct: 100,
            pw: [None; PW_SLOTS],
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Decode
// ═══════════════════════════════════════════════════════════════

/// Decode a pulse vector into a condition. The lowest matching entry wins.
pub fn decode(model: &DeviceModel, pulses: &Pulses) -> Result<Condition, DecodeError> {
    let lookup = model.lookup();
    let slot = lookup.slot;
    let table = model.table(slot).ok_or(DecodeError::SlotNotDriven(slot))?;
    let width = pulses[usize::from(slot) - 1];
    let index = table.find(width).ok_or(DecodeError::NoMatch { slot, width })?;
    Ok(classify(&lookup, index))
}

/// Map a 1-based condition table index to a condition.
pub fn classify(lookup: &ConditionLookup, index: usize) -> Condition {
    if index == 1 {
        return Condition::Normal;
    }
    if lookup.test.is_some_and(|w| w.contains(index)) {
        return Condition::RemoteTest;
    }
    if let Some(w) = lookup.alarm.filter(|w| w.contains(index)) {
        return Condition::Alarm(w.level_of(index));
    }
    if let Some(w) = lookup.trouble.filter(|w| w.contains(index)) {
        return Condition::Trouble(w.level_of(index));
    }
    Condition::Unclassified(u8::try_from(index).unwrap_or(u8::MAX))
}

/// Condition table index for `condition`, applying the window of its class.
pub fn condition_index(lookup: &ConditionLookup, condition: Condition) -> Option<usize> {
    match condition {
        Condition::Normal => Some(1),
        Condition::Trouble(level) => lookup.trouble.map(|w| w.index_for(level)),
        Condition::Alarm(level) => lookup.alarm.map(|w| w.index_for(level)),
        Condition::RemoteTest => lookup.test.map(|w| usize::from(w.start)),
        Condition::Unclassified(index) => Some(usize::from(index)),
    }
}

// ═══════════════════════════════════════════════════════════════
//  Encode
// ═══════════════════════════════════════════════════════════════

/// Synthesise the pulse vector a device in `condition` answers with.
pub fn encode(model: &DeviceModel, condition: Condition) -> Result<Pulses, DecodeError> {
    let lookup = model.lookup();
    let slot = lookup.slot;
    let table = model.table(slot).ok_or(DecodeError::SlotNotDriven(slot))?;
    let width = condition_index(&lookup, condition)
        .and_then(|index| table.representative(index))
        .ok_or(DecodeError::Unrepresentable)?;

    let mut pulses = resting_pulses(model);
    if condition == Condition::RemoteTest {
        if let Some(w) = model.table(2).and_then(|t| t.representative(2)) {
            pulses[1] = w;
        }
    }
    pulses[usize::from(slot) - 1] = width;
    Ok(pulses)
}

/// Entry 1 of every driven slot.
pub fn resting_pulses(model: &DeviceModel) -> Pulses {
    let mut pulses = [0; PW_SLOTS];
    for (i, p) in pulses.iter_mut().enumerate() {
        if let Some(w) = model.table((i + 1) as u8).and_then(|t| t.representative(1)) {
            *p = w;
        }
    }
    pulses
}

/// Pulses for a simulated instance: [`encode`] with a resting fallback,
/// then per-slot overrides and the timing bias.
pub fn synthesize(model: &DeviceModel, condition: Condition, overrides: &PulseOverrides) -> Pulses {
    let mut pulses = encode(model, condition).unwrap_or_else(|e| {
        debug!("Codec: '{}' cannot encode {}: {}", model.name, condition, e);
        resting_pulses(model)
    });

    let condition_slot = usize::from(model.lookup().slot) - 1;
    for (i, (p, fixed)) in pulses.iter_mut().zip(overrides.pw).enumerate() {
        if *p == 0 || i == condition_slot {
            continue;
        }
        if let Some(w) = fixed {
            *p = w;
        }
    }

    if overrides.bias_pct != 100 {
        for p in &mut pulses {
            let scaled = u32::from(*p) * u32::from(overrides.bias_pct) / 100;
            *p = u16::try_from(scaled).unwrap_or(u16::MAX);
        }
    }
    pulses
}
