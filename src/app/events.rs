//! Outbound application events.
//!
//! The [`SimService`](super::service::SimService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log them, collect them in a test,
//! or print them as JSON lines.

use serde::Serialize;

use crate::codec::{Condition, Pulses};
use crate::drivers::switch::SwitchPosition;
use crate::registry::SlotRef;

/// Structured events emitted by the simulation core.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AppEvent {
    /// `init` ran and the scheduler is live.
    Started { blocks: usize, devices: usize },

    Halted,

    Resumed,

    Restarted,

    /// A debounced switch edge was accepted.
    SwitchChanged { switch: u8, position: SwitchPosition },

    /// A slot's condition changed or was re-armed by a script.
    ConditionChanged { slot: SlotRef, condition: Condition },

    /// A trigger script was dispatched for `slot`.
    TriggerFired { slot: SlotRef },

    /// A script invocation was aborted; the scheduler keeps running.
    ScriptFault { binding: String, reason: String },

    /// Dispatches left over after the per-cycle budget.
    DispatchDeferred { pending: usize },

    /// A dispatch was dropped because the queue was full.
    DispatchDropped { binding: String },

    /// A device answered a poll.
    PollAnswered {
        slot: SlotRef,
        ctl: u8,
        pulses: Pulses,
        command: Option<String>,
    },
}
