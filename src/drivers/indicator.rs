//! Indicator (LED) bank driven by scripts.
//!
//! Each indicator is either steadily off, steadily on, or flashing with a
//! fixed half-period.  The scheduler calls `tick()` once per cycle with the
//! elapsed time; the flash phase only advances there, so a flash started
//! during a cycle is observed lit with phase zero at the end of that cycle.
//!
//! ## Mode rules
//!
//! | Call              | Effect                                           |
//! |-------------------|--------------------------------------------------|
//! | `set_on(true)`    | steady on, cancels any flash                     |
//! | `set_on(false)`   | steady off, cancels any flash                    |
//! | `flash(p)`        | flash with period `p`; phase restarts only when  |
//! |                   | `p` differs from the running period              |
//! | `flash(0)`        | same as `set_on(false)`                          |

use serde::Serialize;

/// Indicators addressable as `led[0]`..`led[5]`.
pub const INDICATOR_COUNT: usize = 6;

/// Longest accepted flash period.
pub const MAX_FLASH_MS: u32 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "mode", content = "period_ms")]
pub enum IndicatorMode {
    Off,
    On,
    Flash(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Indicator {
    mode: IndicatorMode,
    phase_ms: u32,
}

impl Indicator {
    const OFF: Self = Self {
        mode: IndicatorMode::Off,
        phase_ms: 0,
    };

    fn lit(&self) -> bool {
        match self.mode {
            IndicatorMode::Off => false,
            IndicatorMode::On => true,
            IndicatorMode::Flash(period) => (self.phase_ms / period) % 2 == 0,
        }
    }
}

/// Observable state of one indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndicatorState {
    pub id: u8,
    pub mode: IndicatorMode,
    pub lit: bool,
}

/// Bank of script indicators. Stack-allocated.
#[derive(Debug, Clone)]
pub struct IndicatorBank {
    leds: [Indicator; INDICATOR_COUNT],
}

impl Default for IndicatorBank {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorBank {
    pub fn new() -> Self {
        Self {
            leds: [Indicator::OFF; INDICATOR_COUNT],
        }
    }

    pub fn is_valid_id(id: i64) -> bool {
        usize::try_from(id).is_ok_and(|i| i < INDICATOR_COUNT)
    }

    /// Steady on/off. Returns `false` for an unknown id.
    pub fn set_on(&mut self, id: u8, on: bool) -> bool {
        let Some(led) = self.leds.get_mut(usize::from(id)) else {
            return false;
        };
        led.mode = if on { IndicatorMode::On } else { IndicatorMode::Off };
        led.phase_ms = 0;
        true
    }

    /// Flash with `period_ms` (clamped to [`MAX_FLASH_MS`]).
    pub fn flash(&mut self, id: u8, period_ms: u32) -> bool {
        if period_ms == 0 {
            return self.set_on(id, false);
        }
        let Some(led) = self.leds.get_mut(usize::from(id)) else {
            return false;
        };
        let period = period_ms.min(MAX_FLASH_MS);
        if led.mode != IndicatorMode::Flash(period) {
            led.mode = IndicatorMode::Flash(period);
            led.phase_ms = 0;
        }
        true
    }

    /// Advance flash phases by `delta_ms`.
    pub fn tick(&mut self, delta_ms: u32) {
        for led in &mut self.leds {
            if let IndicatorMode::Flash(period) = led.mode {
                // Wrap on whole on/off cycles so the phase never overflows.
                led.phase_ms = (led.phase_ms + delta_ms % (2 * period)) % (2 * period);
            }
        }
    }

    pub fn is_lit(&self, id: u8) -> bool {
        self.leds.get(usize::from(id)).is_some_and(Indicator::lit)
    }

    /// Steady-on or flashing.
    pub fn is_on(&self, id: u8) -> bool {
        self.leds
            .get(usize::from(id))
            .is_some_and(|l| l.mode != IndicatorMode::Off)
    }

    pub fn flash_period(&self, id: u8) -> Option<u32> {
        match self.leds.get(usize::from(id))?.mode {
            IndicatorMode::Flash(p) => Some(p),
            _ => None,
        }
    }

    pub fn clear_all(&mut self) {
        self.leds = [Indicator::OFF; INDICATOR_COUNT];
    }

    pub fn states(&self) -> Vec<IndicatorState> {
        self.leds
            .iter()
            .enumerate()
            .map(|(i, l)| IndicatorState {
                id: i as u8,
                mode: l.mode,
                lit: l.lit(),
            })
            .collect()
    }
}
