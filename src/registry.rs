//! Device registry: two fixed arrays of 160 addressable slots.
//!
//! Slots are addressed 1-based.  A slot that was never provisioned is an
//! inert placeholder; nothing is ever removed, "deletion" is disabling.
//! Re-provisioning an address silently overwrites it (last write wins).
//!
//! Condition mutations go through one path that enforces two rules:
//!
//! - a disabled slot ignores every condition change, and
//! - a slot whose condition changed (or that a script re-armed) is queued
//!   once for trigger evaluation until [`Registry::take_changes`] drains it.

use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::catalog::{DeviceKind, DeviceModel, PW_SLOTS};
use crate::codec::{self, Condition, MAX_LEVEL, PulseOverrides, Pulses};
use crate::error::RegistryError;

/// Slots per device kind.
pub const MAX_ADDRESS: u8 = 160;

/// Group memberships a device can hold.
pub const MAX_GROUPS: usize = 4;

/// Number of output flags (`out1`..`out5`).
pub const OUTPUTS: usize = 5;

/// Bits of control history kept per device (ten 3-bit polls).
const HISTORY_MASK: u32 = (1 << 30) - 1;

// ═══════════════════════════════════════════════════════════════
//  Slot reference
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SlotRef {
    pub kind: DeviceKind,
    pub address: u8,
}

impl SlotRef {
    pub fn new(kind: DeviceKind, address: u8) -> Self {
        Self { kind, address }
    }

    pub fn sensor(address: u8) -> Self {
        Self::new(DeviceKind::Sensor, address)
    }

    pub fn module(address: u8) -> Self {
        Self::new(DeviceKind::Module, address)
    }
}

impl core::fmt::Display for SlotRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}[{}]", self.kind, self.address)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Device instance
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct DeviceInstance {
    pub kind: DeviceKind,
    pub address: u8,
    pub model: Arc<DeviceModel>,
    pub groups: heapless::Vec<u8, MAX_GROUPS>,
    pub enabled: bool,
    pub alarm: u8,
    pub trouble: u8,
    pub remote_test: bool,
    pub tag: String,
    pub led: bool,
    pub outputs: [bool; OUTPUTS],
    pub overrides: PulseOverrides,
    pub poll_count: u32,
    /// Control codes of recent polls, 3 bits each, newest lowest.
    pub control_history: u32,
    armed: bool,
}

impl DeviceInstance {
    fn new(kind: DeviceKind, address: u8, model: Arc<DeviceModel>) -> Self {
        Self {
            kind,
            address,
            model,
            groups: heapless::Vec::new(),
            enabled: false,
            alarm: 0,
            trouble: 0,
            remote_test: false,
            tag: String::new(),
            led: false,
            outputs: [false; OUTPUTS],
            overrides: PulseOverrides::default(),
            poll_count: 0,
            control_history: 0,
            armed: false,
        }
    }

    pub fn slot(&self) -> SlotRef {
        SlotRef::new(self.kind, self.address)
    }

    /// Derived condition: remote test, then alarm, then trouble.
    pub fn condition(&self) -> Condition {
        if self.remote_test {
            Condition::RemoteTest
        } else if self.alarm > 0 {
            Condition::Alarm(self.alarm)
        } else if self.trouble > 0 {
            Condition::Trouble(self.trouble)
        } else {
            Condition::Normal
        }
    }

    pub fn in_group(&self, group: u8) -> bool {
        self.groups.contains(&group)
    }

    /// The pulse vector this device answers a poll with.
    pub fn pulses(&self) -> Pulses {
        codec::synthesize(&self.model, self.condition(), &self.overrides)
    }

    fn apply(&mut self, condition: Condition) {
        let (alarm, trouble, test) = match condition {
            Condition::Normal => (0, 0, false),
            Condition::Alarm(l) => (l.min(MAX_LEVEL), 0, false),
            Condition::Trouble(l) => (0, l.min(MAX_LEVEL), false),
            Condition::RemoteTest => (self.alarm, self.trouble, true),
            Condition::Unclassified(_) => (0, 1, false),
        };
        self.alarm = alarm;
        self.trouble = trouble;
        self.remote_test = test;
    }
}

/// Read-only copy of one slot, for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub kind: DeviceKind,
    pub address: u8,
    pub model: String,
    pub condition: Condition,
    pub enabled: bool,
    pub tag: String,
    pub groups: Vec<u8>,
    pub led: bool,
}

impl From<&DeviceInstance> for DeviceStatus {
    fn from(d: &DeviceInstance) -> Self {
        Self {
            kind: d.kind,
            address: d.address,
            model: d.model.name.clone(),
            condition: d.condition(),
            enabled: d.enabled,
            tag: d.tag.clone(),
            groups: d.groups.to_vec(),
            led: d.led,
        }
    }
}

/// Result of recording a poll on a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRecord {
    /// Index into the model's command list of the first matching sequence.
    pub command: Option<usize>,
}

// ═══════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Registry {
    sensors: Vec<Option<DeviceInstance>>,
    modules: Vec<Option<DeviceInstance>>,
    changes: Vec<SlotRef>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            sensors: vec![None; usize::from(MAX_ADDRESS)],
            modules: vec![None; usize::from(MAX_ADDRESS)],
            changes: Vec::new(),
        }
    }

    /// Validate a 1-based address.
    pub fn check_address(kind: DeviceKind, address: u32) -> Result<u8, RegistryError> {
        if (1..=u32::from(MAX_ADDRESS)).contains(&address) {
            Ok(address as u8)
        } else {
            Err(RegistryError::AddressOutOfRange { kind, address })
        }
    }

    fn slots(&self, kind: DeviceKind) -> &[Option<DeviceInstance>] {
        match kind {
            DeviceKind::Sensor => &self.sensors,
            DeviceKind::Module => &self.modules,
        }
    }

    fn slots_mut(&mut self, kind: DeviceKind) -> &mut [Option<DeviceInstance>] {
        match kind {
            DeviceKind::Sensor => &mut self.sensors,
            DeviceKind::Module => &mut self.modules,
        }
    }

    // ── Provisioning ──────────────────────────────────────────

    /// Assign `model` to every address in `addresses`. The whole record is
    /// validated before any slot is touched.
    pub fn provision(
        &mut self,
        kind: DeviceKind,
        addresses: &[u32],
        model: Arc<DeviceModel>,
        groups: &[u32],
        enabled: bool,
        tag: &str,
    ) -> Result<usize, RegistryError> {
        let addrs = addresses
            .iter()
            .map(|a| Self::check_address(kind, *a))
            .collect::<Result<Vec<_>, _>>()?;

        let mut set: heapless::Vec<u8, MAX_GROUPS> = heapless::Vec::new();
        for g in groups {
            let g = u8::try_from(*g)
                .ok()
                .filter(|g| *g != 0)
                .ok_or(RegistryError::InvalidGroup(*g))?;
            if !set.contains(&g) && set.push(g).is_err() {
                return Err(RegistryError::TooManyGroups {
                    kind,
                    address: addrs.first().copied().unwrap_or(0),
                });
            }
        }

        for &address in &addrs {
            let mut dev = DeviceInstance::new(kind, address, Arc::clone(&model));
            dev.groups = set.clone();
            dev.enabled = enabled;
            dev.tag = tag.to_string();
            let slot = &mut self.slots_mut(kind)[usize::from(address) - 1];
            if let Some(prev) = slot.as_ref() {
                debug!(
                    "Registry: {}[{}] re-provisioned ({} -> {})",
                    kind, address, prev.model.name, model.name
                );
            }
            *slot = Some(dev);
        }
        self.changes.retain(|s| !(s.kind == kind && addrs.contains(&s.address)));
        info!(
            "Registry: provisioned {} {}(s) as '{}'",
            addrs.len(),
            kind,
            model.name
        );
        Ok(addrs.len())
    }

    // ── Lookup ────────────────────────────────────────────────

    pub fn get(&self, kind: DeviceKind, address: u32) -> Result<&DeviceInstance, RegistryError> {
        let address = Self::check_address(kind, address)?;
        self.slots(kind)[usize::from(address) - 1]
            .as_ref()
            .ok_or(RegistryError::Unprovisioned { kind, address })
    }

    pub fn get_mut(&mut self, kind: DeviceKind, address: u32) -> Result<&mut DeviceInstance, RegistryError> {
        let address = Self::check_address(kind, address)?;
        self.slots_mut(kind)[usize::from(address) - 1]
            .as_mut()
            .ok_or(RegistryError::Unprovisioned { kind, address })
    }

    pub fn is_provisioned(&self, kind: DeviceKind, address: u32) -> bool {
        self.get(kind, address).is_ok()
    }

    /// Provisioned instances, sensors first, in address order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceInstance> {
        self.sensors.iter().chain(self.modules.iter()).flatten()
    }

    pub fn snapshot(&self) -> Vec<DeviceStatus> {
        self.iter().map(DeviceStatus::from).collect()
    }

    // ── Enable / condition ────────────────────────────────────

    pub fn set_enabled(&mut self, kind: DeviceKind, address: u32, enabled: bool) -> Result<(), RegistryError> {
        let dev = self.get_mut(kind, address)?;
        if dev.enabled != enabled {
            debug!("Registry: {} {}", dev.slot(), if enabled { "enabled" } else { "disabled" });
        }
        dev.enabled = enabled;
        Ok(())
    }

    /// Set the alarm level. Returns `false` when the slot is disabled and
    /// the write was suppressed.
    pub fn set_alarm(&mut self, kind: DeviceKind, address: u32, level: u8, rearm: bool) -> Result<bool, RegistryError> {
        self.mutate_condition(kind, address, rearm, |d| d.alarm = level.min(MAX_LEVEL))
    }

    pub fn set_trouble(&mut self, kind: DeviceKind, address: u32, level: u8, rearm: bool) -> Result<bool, RegistryError> {
        self.mutate_condition(kind, address, rearm, |d| d.trouble = level.min(MAX_LEVEL))
    }

    pub fn set_remote_test(&mut self, kind: DeviceKind, address: u32, on: bool, rearm: bool) -> Result<bool, RegistryError> {
        self.mutate_condition(kind, address, rearm, |d| d.remote_test = on)
    }

    /// Force the instance into `condition`.
    pub fn set_condition(
        &mut self,
        kind: DeviceKind,
        address: u32,
        condition: Condition,
        rearm: bool,
    ) -> Result<bool, RegistryError> {
        self.mutate_condition(kind, address, rearm, |d| d.apply(condition))
    }

    /// Decode a reported pulse vector and adopt the result. Anything that
    /// does not decode to a known class becomes `Trouble(1)`.
    pub fn apply_pulses(&mut self, kind: DeviceKind, address: u32, pulses: &Pulses) -> Result<Condition, RegistryError> {
        let dev = self.get(kind, address)?;
        let condition = match codec::decode(&dev.model, pulses) {
            Ok(Condition::Unclassified(index)) => {
                debug!("Registry: {} reported unclassified entry {}", dev.slot(), index);
                Condition::Trouble(1)
            }
            Ok(c) => c,
            Err(e) => {
                warn!("Registry: {} pulse feedback: {}", dev.slot(), e);
                Condition::Trouble(1)
            }
        };
        self.set_condition(kind, address, condition, false)?;
        Ok(condition)
    }

    fn mutate_condition(
        &mut self,
        kind: DeviceKind,
        address: u32,
        rearm: bool,
        f: impl FnOnce(&mut DeviceInstance),
    ) -> Result<bool, RegistryError> {
        let dev = self.get_mut(kind, address)?;
        if !dev.enabled {
            debug!("Registry: {} disabled, condition change suppressed", dev.slot());
            return Ok(false);
        }
        let before = dev.condition();
        f(dev);
        let after = dev.condition();
        let queue = (rearm || before != after) && !dev.armed;
        if queue {
            dev.armed = true;
        }
        let slot = dev.slot();
        if before != after {
            debug!("Registry: {} {} -> {}", slot, before, after);
        }
        if queue {
            self.changes.push(slot);
        }
        Ok(true)
    }

    /// Drain the slots whose condition changed or were re-armed, in the
    /// order they were first touched. Slots disabled since are dropped.
    pub fn take_changes(&mut self) -> Vec<SlotRef> {
        let pending = std::mem::take(&mut self.changes);
        let mut out = Vec::with_capacity(pending.len());
        for slot in pending {
            if let Ok(dev) = self.get_mut(slot.kind, u32::from(slot.address)) {
                dev.armed = false;
                if dev.enabled {
                    out.push(slot);
                }
            }
        }
        out
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    // ── Groups ────────────────────────────────────────────────

    pub fn group_insert(&mut self, kind: DeviceKind, address: u32, group: u8) -> Result<(), RegistryError> {
        if group == 0 {
            return Err(RegistryError::InvalidGroup(0));
        }
        let dev = self.get_mut(kind, address)?;
        if dev.in_group(group) {
            return Ok(());
        }
        let slot = dev.slot();
        dev.groups.push(group).map_err(|_| RegistryError::TooManyGroups {
            kind: slot.kind,
            address: slot.address,
        })
    }

    pub fn group_remove(&mut self, kind: DeviceKind, address: u32, group: u8) -> Result<(), RegistryError> {
        let dev = self.get_mut(kind, address)?;
        dev.groups.retain(|g| *g != group);
        Ok(())
    }

    pub fn group_clear(&mut self, kind: DeviceKind, address: u32) -> Result<(), RegistryError> {
        self.get_mut(kind, address)?.groups.clear();
        Ok(())
    }

    /// Provisioned slots that belong to `group`.
    pub fn group_members(&self, group: u8) -> Vec<SlotRef> {
        self.iter()
            .filter(|d| d.in_group(group))
            .map(DeviceInstance::slot)
            .collect()
    }

    // ── Polling ───────────────────────────────────────────────

    /// Count a poll, shift `ctl` into the control history and look for a
    /// matching command sequence. `None` when the device does not answer.
    pub fn record_poll(&mut self, kind: DeviceKind, address: u32, ctl: u8) -> Option<PollRecord> {
        let dev = self.get_mut(kind, address).ok().filter(|d| d.enabled)?;
        dev.poll_count = dev.poll_count.wrapping_add(1);
        dev.control_history = ((dev.control_history << 3) | u32::from(ctl & 0b111)) & HISTORY_MASK;
        let history = dev.control_history;
        let command = dev.model.commands.iter().position(|c| c.pattern.matches(history));
        Some(PollRecord { command })
    }
}

/// Validate a per-slot pulse override (`pw1`..`pw5` are 1-based).
pub fn override_slot(slot: u8) -> Option<usize> {
    (1..=PW_SLOTS as u8).contains(&slot).then(|| usize::from(slot) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModelRecord, load_catalog};
    use serde_json::json;

    fn model() -> Arc<DeviceModel> {
        let rec: ModelRecord = serde_json::from_value(json!({
            "model": "2251B",
            "pw1": [270, 330],
            "pw4": [
                ["Normal", 618, 1068],
                ["Trouble", 120, 660],
                ["Smoke Alarm 1", 1260, 1775],
                ["Smoke Alarm 2", 1775, 2395],
                ["Smoke Alarm 3", 2395, 2800],
                ["Remote Test", 3100, 3825]
            ],
            "lut": { "pw": 4, "tbl": [2, 1], "alm": [3, 3], "tst": [6, 1] },
            "cmd": [ { "tag": "two", "seq": ["1x1", "1x1"], "js": "this.out1 = true;" } ]
        }))
        .unwrap();
        let catalog = load_catalog([(DeviceKind::Sensor, rec)]).unwrap();
        catalog.models().next().unwrap().clone()
    }

    fn registry() -> Registry {
        let mut r = Registry::new();
        r.provision(DeviceKind::Sensor, &[1, 2, 17], model(), &[1, 2], true, "board 1")
            .unwrap();
        r
    }

    #[test]
    fn out_of_range_addresses_are_rejected() {
        let mut r = Registry::new();
        for bad in [0, 161, 1000] {
            assert_eq!(
                r.provision(DeviceKind::Sensor, &[1, bad], model(), &[], true, ""),
                Err(RegistryError::AddressOutOfRange {
                    kind: DeviceKind::Sensor,
                    address: bad
                })
            );
        }
        // Nothing from the rejected records was applied.
        assert!(!r.is_provisioned(DeviceKind::Sensor, 1));
    }

    #[test]
    fn unprovisioned_get_fails() {
        let r = registry();
        assert_eq!(
            r.get(DeviceKind::Module, 1).unwrap_err(),
            RegistryError::Unprovisioned {
                kind: DeviceKind::Module,
                address: 1
            }
        );
    }

    #[test]
    fn too_many_groups() {
        let mut r = Registry::new();
        let err = r
            .provision(DeviceKind::Sensor, &[5], model(), &[1, 2, 3, 4, 5], true, "")
            .unwrap_err();
        assert!(matches!(err, RegistryError::TooManyGroups { .. }));
        assert_eq!(
            r.provision(DeviceKind::Sensor, &[5], model(), &[0], true, ""),
            Err(RegistryError::InvalidGroup(0))
        );
    }

    #[test]
    fn condition_changes_are_queued_once() {
        let mut r = registry();
        assert_eq!(r.set_alarm(DeviceKind::Sensor, 17, 2, false), Ok(true));
        assert_eq!(r.set_alarm(DeviceKind::Sensor, 17, 3, false), Ok(true));
        assert_eq!(r.take_changes(), vec![SlotRef::sensor(17)]);
        assert!(r.take_changes().is_empty());
        assert_eq!(r.get(DeviceKind::Sensor, 17).unwrap().condition(), Condition::Alarm(3));
    }

    #[test]
    fn unchanged_write_queues_only_when_rearmed() {
        let mut r = registry();
        r.set_alarm(DeviceKind::Sensor, 1, 0, false).unwrap();
        assert!(r.take_changes().is_empty());
        r.set_alarm(DeviceKind::Sensor, 1, 0, true).unwrap();
        assert_eq!(r.take_changes(), vec![SlotRef::sensor(1)]);
    }

    #[test]
    fn disabled_slot_suppresses_changes() {
        let mut r = registry();
        r.set_enabled(DeviceKind::Sensor, 2, false).unwrap();
        assert_eq!(r.set_alarm(DeviceKind::Sensor, 2, 1, true), Ok(false));
        assert_eq!(r.get(DeviceKind::Sensor, 2).unwrap().condition(), Condition::Normal);
        assert!(r.take_changes().is_empty());
    }

    #[test]
    fn disabling_after_change_drops_pending_trigger() {
        let mut r = registry();
        r.set_trouble(DeviceKind::Sensor, 2, 1, false).unwrap();
        r.set_enabled(DeviceKind::Sensor, 2, false).unwrap();
        assert!(r.take_changes().is_empty());
    }

    #[test]
    fn condition_priority() {
        let mut r = registry();
        r.set_trouble(DeviceKind::Sensor, 1, 2, false).unwrap();
        assert_eq!(r.get(DeviceKind::Sensor, 1).unwrap().condition(), Condition::Trouble(2));
        r.set_alarm(DeviceKind::Sensor, 1, 1, false).unwrap();
        assert_eq!(r.get(DeviceKind::Sensor, 1).unwrap().condition(), Condition::Alarm(1));
        r.set_remote_test(DeviceKind::Sensor, 1, true, false).unwrap();
        assert_eq!(r.get(DeviceKind::Sensor, 1).unwrap().condition(), Condition::RemoteTest);
    }

    #[test]
    fn pulse_feedback_decodes_or_falls_back_to_trouble() {
        let mut r = registry();
        assert_eq!(
            r.apply_pulses(DeviceKind::Sensor, 1, &[300, 0, 0, 2085, 0]),
            Ok(Condition::Alarm(2))
        );
        assert_eq!(
            r.apply_pulses(DeviceKind::Sensor, 1, &[300, 0, 0, 3000, 0]),
            Ok(Condition::Trouble(1))
        );
        assert_eq!(r.get(DeviceKind::Sensor, 1).unwrap().condition(), Condition::Trouble(1));
    }

    #[test]
    fn groups() {
        let mut r = registry();
        r.group_insert(DeviceKind::Sensor, 1, 7).unwrap();
        r.group_insert(DeviceKind::Sensor, 1, 8).unwrap();
        assert!(matches!(
            r.group_insert(DeviceKind::Sensor, 1, 9),
            Err(RegistryError::TooManyGroups { .. })
        ));
        r.group_remove(DeviceKind::Sensor, 1, 2).unwrap();
        r.group_insert(DeviceKind::Sensor, 1, 9).unwrap();
        assert_eq!(r.group_members(9), vec![SlotRef::sensor(1)]);
        assert_eq!(r.group_members(1).len(), 3);
        r.group_clear(DeviceKind::Sensor, 1).unwrap();
        assert!(r.get(DeviceKind::Sensor, 1).unwrap().groups.is_empty());
    }

    #[test]
    fn poll_history_matches_command_sequence() {
        let mut r = registry();
        assert_eq!(r.record_poll(DeviceKind::Sensor, 1, 0b101), Some(PollRecord { command: None }));
        assert_eq!(r.record_poll(DeviceKind::Sensor, 1, 0b111), Some(PollRecord { command: Some(0) }));
        assert_eq!(r.record_poll(DeviceKind::Sensor, 1, 0b000), Some(PollRecord { command: None }));
        assert_eq!(r.get(DeviceKind::Sensor, 1).unwrap().poll_count, 3);
        // Disabled and unprovisioned devices stay silent.
        r.set_enabled(DeviceKind::Sensor, 2, false).unwrap();
        assert_eq!(r.record_poll(DeviceKind::Sensor, 2, 0), None);
        assert_eq!(r.record_poll(DeviceKind::Sensor, 99, 0), None);
    }

    #[test]
    fn snapshot_lists_provisioned_slots() {
        let r = registry();
        let snap = r.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[2].address, 17);
        assert_eq!(snap[2].tag, "board 1");
        assert_eq!(snap[2].groups, vec![1, 2]);
    }
}
