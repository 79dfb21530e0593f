//! Port traits: the boundary between the simulation core and the host.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ SimService (domain)
//! ```
//!
//! Driven adapters (switch panel, console, event sinks) implement these
//! traits.  The [`SimService`](super::service::SimService) consumes them
//! via generics, so the engine never touches stdin/stdout or a clock
//! directly and every path can be driven from tests with mock adapters.

use crate::drivers::switch::SwitchPosition;
use crate::script::ScriptBinding;

/// Number of lever switches on the simulator panel.
pub const SWITCH_COUNT: u8 = 2;

// ───────────────────────────────────────────────────────────────
// Switch port (driven adapter: panel → domain)
// ───────────────────────────────────────────────────────────────

/// Raw lever positions, sampled once per cycle before debouncing.
pub trait SwitchPort {
    /// Current raw position of switch `switch` (1-based).
    fn read_switch(&mut self, switch: u8) -> SwitchPosition;
}

// ───────────────────────────────────────────────────────────────
// Console port (driven adapter: domain → operator console)
// ───────────────────────────────────────────────────────────────

/// Text written by `printf()` / `print()` in scripts.
pub trait ConsolePort {
    fn print(&mut self, text: &str);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AppEvent`](super::events::AppEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::AppEvent);
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn emit(&mut self, event: &super::events::AppEvent) {
        (**self).emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Timer delegate (decouples timers from the dispatch queue)
// ───────────────────────────────────────────────────────────────

/// Callback the [`TimerBank`](crate::timer::TimerBank) invokes when a
/// timer expires.
///
/// The dispatch queue implements this, but the timer bank itself knows
/// nothing about queues or scripts beyond the binding it was armed with.
pub trait TimerDelegate {
    /// Called once per expiry, in timer id order.
    fn on_timer_expired(&mut self, id: u8, event: ScriptBinding);
}
