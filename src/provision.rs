//! Instance configuration loader.
//!
//! An instance file says which catalog model sits at which loop address,
//! and which scripts are bound to which events:
//!
//! ```text
//! {
//!   "sensor":  { "model": "2251B", "addr": [1, 2, 3], "group": [1], "rem": "Board 1" },
//!   "module":  { "model": "M500M", "addr": 7, "enabled": false },
//!   "sw1":     { "up": [..lines..], "off": [..], "down": [..] },
//!   "misc":    { "init": [..], "tmr1": [..], "usr3": [..] },
//!   "trigger": { "sensor": true, "addr": 17, "script": [..] },
//!   "script":  { "label": "flood", "script": [..] }
//! }
//! ```
//!
//! Keys repeat and are applied in file order.  Script syntax errors are
//! load-time failures; device records that cannot be provisioned are
//! logged and skipped.

use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

use crate::catalog::{Catalog, DeviceKind};
use crate::drivers::switch::SwitchPosition;
use crate::error::{CatalogError, RegistryError};
use crate::json::{self, OneOrMany, OrderedObject, ScriptLines};
use crate::registry::{Registry, SlotRef};
use crate::script::{self, Script, ScriptBinding, USER_EVENTS};
use crate::timer::TIMER_COUNT;

/// Accepted range of the `tbias` override.
const TBIAS_RANGE: core::ops::RangeInclusive<u8> = 1..=199;

/// Pulse overrides must stay below this width.
const MAX_PULSE_OVERRIDE: u16 = 8000;

// ═══════════════════════════════════════════════════════════════
//  Records
// ═══════════════════════════════════════════════════════════════

fn enabled_by_default() -> bool {
    true
}

/// One `"sensor"` / `"module"` provisioning record.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceRecord {
    pub model: String,
    #[serde(default)]
    pub addr: OneOrMany,
    #[serde(default)]
    pub group: OneOrMany,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default, alias = "rem")]
    pub tag: String,
    #[serde(default)]
    pub tbias: Option<u8>,
    #[serde(default)]
    pub pw1: Option<u16>,
    #[serde(default)]
    pub pw2: Option<u16>,
    #[serde(default)]
    pub pw3: Option<u16>,
    #[serde(default)]
    pub pw4: Option<u16>,
    #[serde(default)]
    pub pw5: Option<u16>,
}

impl DeviceRecord {
    fn pulse_overrides(&self) -> [Option<u16>; 5] {
        [self.pw1, self.pw2, self.pw3, self.pw4, self.pw5]
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SwitchRecord {
    #[serde(default)]
    up: Option<ScriptLines>,
    #[serde(default)]
    off: Option<ScriptLines>,
    #[serde(default)]
    down: Option<ScriptLines>,
}

#[derive(Debug, Clone, Deserialize)]
struct TriggerRecord {
    #[serde(default)]
    module: bool,
    addr: OneOrMany,
    script: ScriptLines,
}

#[derive(Debug, Clone, Deserialize)]
struct LabelRecord {
    label: String,
    script: ScriptLines,
}

/// A device record together with the key it was read under.
#[derive(Debug, Clone)]
pub struct Provision {
    pub kind: DeviceKind,
    pub record: DeviceRecord,
}

/// Parsed instance file.
#[derive(Debug, Clone, Default)]
pub struct InstanceConfig {
    pub info: Option<Value>,
    pub devices: Vec<Provision>,
    pub scripts: Vec<(ScriptBinding, Script)>,
}

/// Outcome of applying the device records to a registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionReport {
    pub provisioned: usize,
    pub skipped: Vec<RegistryError>,
}

// ═══════════════════════════════════════════════════════════════
//  Parsing
// ═══════════════════════════════════════════════════════════════

fn compile(context: impl FnOnce() -> String, lines: &ScriptLines) -> Result<Script, CatalogError> {
    script::parse(&lines.source()).map_err(|error| CatalogError::Script {
        context: context(),
        error,
    })
}

/// Binding of a `misc` / `events` key: `init`, `tmr1`..`tmr4`, `usr1`..`usr8`.
fn event_binding(key: &str) -> Option<ScriptBinding> {
    if key == "init" {
        return Some(ScriptBinding::Init);
    }
    let numbered = |prefix: &str, max: u8| {
        key.strip_prefix(prefix)
            .and_then(|n| n.parse::<u8>().ok())
            .filter(|n| (1..=max).contains(n))
    };
    numbered("tmr", TIMER_COUNT as u8)
        .map(ScriptBinding::Timer)
        .or_else(|| numbered("usr", USER_EVENTS).map(ScriptBinding::UserEvent))
}

pub fn parse_instance_config(text: &str) -> Result<InstanceConfig, CatalogError> {
    let doc = OrderedObject::parse(text)?;
    let mut config = InstanceConfig::default();
    for (position, (key, value)) in doc.iter().enumerate() {
        match key {
            "sensor" | "module" => {
                let kind = DeviceKind::from_key(key).unwrap_or(DeviceKind::Sensor);
                let record = json::record::<DeviceRecord>(key, position, value)?;
                config.devices.push(Provision { kind, record });
            }
            "sw1" | "sw2" => {
                let switch = if key == "sw1" { 1 } else { 2 };
                let rec = json::record::<SwitchRecord>(key, position, value)?;
                let edges = [
                    (SwitchPosition::Up, rec.up),
                    (SwitchPosition::Off, rec.off),
                    (SwitchPosition::Down, rec.down),
                ];
                for (edge, lines) in edges {
                    if let Some(lines) = lines {
                        let binding = ScriptBinding::SwitchEdge { switch, edge };
                        let script = compile(|| binding.to_string(), &lines)?;
                        config.scripts.push((binding, script));
                    }
                }
            }
            "misc" | "events" => {
                let events = json::record::<serde_json::Map<String, Value>>(key, position, value)?;
                for (name, raw) in &events {
                    let binding = event_binding(name)
                        .ok_or_else(|| CatalogError::Parse(format!("{key} record #{position}: unknown event '{name}'")))?;
                    let lines = json::record::<ScriptLines>(name, position, raw)?;
                    let script = compile(|| binding.to_string(), &lines)?;
                    config.scripts.push((binding, script));
                }
            }
            "trigger" => {
                let rec = json::record::<TriggerRecord>(key, position, value)?;
                let kind = if rec.module {
                    DeviceKind::Module
                } else {
                    DeviceKind::Sensor
                };
                let script = compile(|| format!("trigger record #{position}"), &rec.script)?;
                for address in rec.addr.into_vec() {
                    match Registry::check_address(kind, address) {
                        Ok(a) => config
                            .scripts
                            .push((ScriptBinding::Trigger(SlotRef::new(kind, a)), script.clone())),
                        Err(e) => warn!("Config: trigger record #{}: {}", position, e),
                    }
                }
            }
            "script" => {
                let rec = json::record::<LabelRecord>(key, position, value)?;
                let binding = ScriptBinding::Named(rec.label);
                let script = compile(|| binding.to_string(), &rec.script)?;
                config.scripts.push((binding, script));
            }
            "info" => config.info = Some(value.clone()),
            other => debug!("Config: ignoring top-level key '{}'", other),
        }
    }
    info!(
        "Config: {} device records, {} scripts",
        config.devices.len(),
        config.scripts.len()
    );
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════
//  Provisioning
// ═══════════════════════════════════════════════════════════════

impl InstanceConfig {
    /// Apply every device record in file order. Later records overwrite
    /// earlier ones; failing records are logged and skipped.
    pub fn provision(&self, catalog: &Catalog, registry: &mut Registry) -> ProvisionReport {
        let mut report = ProvisionReport::default();
        for Provision { kind, record } in &self.devices {
            match provision_one(*kind, record, catalog, registry) {
                Ok(n) => report.provisioned += n,
                Err(e) => {
                    warn!("Config: {} record '{}' skipped: {}", kind, record.model, e);
                    report.skipped.push(e);
                }
            }
        }
        info!(
            "Config: {} slots provisioned, {} records skipped",
            report.provisioned,
            report.skipped.len()
        );
        report
    }
}

fn provision_one(
    kind: DeviceKind,
    record: &DeviceRecord,
    catalog: &Catalog,
    registry: &mut Registry,
) -> Result<usize, RegistryError> {
    let model = catalog
        .get(kind, &record.model)
        .ok_or_else(|| RegistryError::UnknownModel {
            kind,
            model: record.model.clone(),
        })?;
    let addresses = record.addr.clone().into_vec();
    let groups = record.group.clone().into_vec();
    let count = registry.provision(kind, &addresses, model, &groups, record.enabled, &record.tag)?;

    let bias = record.tbias.map(|b| {
        let clamped = b.clamp(*TBIAS_RANGE.start(), *TBIAS_RANGE.end());
        if clamped != b {
            warn!("Config: {} '{}' tbias {} clamped to {}", kind, record.model, b, clamped);
        }
        clamped
    });
    let pulses = record.pulse_overrides().map(|pw| {
        pw.filter(|w| {
            let ok = *w < MAX_PULSE_OVERRIDE;
            if !ok {
                warn!("Config: {} '{}' pulse override {} ignored", kind, record.model, w);
            }
            ok && *w != 0
        })
    });
    for address in addresses {
        let dev = registry.get_mut(kind, address)?;
        if let Some(b) = bias {
            dev.overrides.bias_pct = b;
        }
        for (slot, pw) in dev.overrides.pw.iter_mut().zip(pulses) {
            if pw.is_some() {
                *slot = pw;
            }
        }
    }
    Ok(count)
}
