//! Inbound control queries.
//!
//! These represent actions requested by the outside world (an operator
//! console, a test harness, the SLC master) that the
//! [`SimService`](super::service::SimService) interprets and acts upon.

use serde::Deserialize;

use crate::catalog::DeviceKind;
use crate::codec::Pulses;

/// Commands that external adapters can send into the simulation core.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlCommand {
    /// Re-enable a slot.
    Enable { kind: DeviceKind, address: u32 },

    /// Disable a slot; further condition changes are suppressed.
    Disable { kind: DeviceKind, address: u32 },

    /// Force the alarm level (0 clears).
    SetAlarm { kind: DeviceKind, address: u32, level: u8 },

    /// Force the trouble level (0 clears).
    SetTrouble { kind: DeviceKind, address: u32, level: u8 },

    SetRemoteTest { kind: DeviceKind, address: u32, on: bool },

    /// Halt the scheduler. Cycles become no-ops until `Resume`.
    Stop,

    Resume,

    /// Clear script scopes, timers, indicators and pending dispatches,
    /// then re-run `init`.
    Restart,

    /// Raise user event `usr<event>`.
    RaiseUser { event: u8 },

    /// Poll a device with a 3-bit control code.
    Poll { kind: DeviceKind, address: u32, ctl: u8 },

    /// Feed back a measured pulse vector for a device.
    ReportPulses { kind: DeviceKind, address: u32, pulses: Pulses },
}
