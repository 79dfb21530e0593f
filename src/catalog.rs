//! Device catalog: the immutable table of device models.
//!
//! Each model owns up to five pulse-width tables (`pw1`..`pw5`), an
//! optional condition lookup that carves trouble/alarm/test windows out of
//! one of those tables, and an optional list of command sequences matched
//! against the control bits a polling master sends.
//!
//! ```text
//!  "pw4": [ ["Normal", 618, 1068],      <- index 1, always Normal
//!           ["Trouble", 120, 660],      <- tbl = [2, 1]
//!           ["Smoke Alarm 1", ...],     <- alm = [3, 3]
//!           ["Smoke Alarm 2", ...],
//!           ["Smoke Alarm 3", ...],
//!           ["Remote Test", ...] ]      <- tst = [6, 1]
//! ```
//!
//! Overlapping ranges are tolerated as long as every entry keeps at least
//! one width that no lower-index entry claims; decode picks the lowest
//! matching index.

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CatalogError;
use crate::json::{self, OrderedObject, ScriptLines};
use crate::script::{self, Script};

/// Number of pulse-width slots per device answer.
pub const PW_SLOTS: usize = 5;

/// Deepest command sequence, in polls. Ten 3-bit codes fill 30 bits.
pub const MAX_SEQUENCE_POLLS: usize = 10;

// ═══════════════════════════════════════════════════════════════
//  Device kind
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Sensor,
    Module,
}

impl DeviceKind {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "sensor" => Some(Self::Sensor),
            "module" => Some(Self::Module),
            _ => None,
        }
    }
}

impl core::fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Sensor => write!(f, "sensor"),
            Self::Module => write!(f, "module"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pulse-width tables
// ═══════════════════════════════════════════════════════════════

/// One table entry. A single value is stored as `min == max`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwEntry {
    pub label: Option<String>,
    pub min: u16,
    pub max: u16,
}

impl PwEntry {
    pub fn range(min: u16, max: u16) -> Self {
        Self {
            label: None,
            min,
            max,
        }
    }

    pub fn labelled(label: &str, min: u16, max: u16) -> Self {
        Self {
            label: Some(label.to_string()),
            min,
            max,
        }
    }

    pub fn contains(&self, width: u16) -> bool {
        (self.min..=self.max).contains(&width)
    }

    pub fn midpoint(&self) -> u16 {
        ((u32::from(self.min) + u32::from(self.max)) / 2) as u16
    }
}

/// Ordered entries of one pw slot, with the synthesis width of every entry
/// precomputed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseWidthTable {
    entries: Vec<PwEntry>,
    representatives: Vec<u16>,
}

impl PulseWidthTable {
    /// Build a table. Fails with the 1-based index of the first entry that
    /// lower-index entries shadow completely.
    pub fn new(entries: Vec<PwEntry>) -> Result<Self, usize> {
        let mut representatives = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let lower = &entries[..i];
            let claimed = |w: u16| lower.iter().any(|e| e.contains(w));
            let rep = nearest_unclaimed(entry, claimed).ok_or(i + 1)?;
            representatives.push(rep);
        }
        Ok(Self {
            entries,
            representatives,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by 1-based index.
    pub fn get(&self, index: usize) -> Option<&PwEntry> {
        index.checked_sub(1).and_then(|i| self.entries.get(i))
    }

    pub fn entries(&self) -> &[PwEntry] {
        &self.entries
    }

    /// 1-based index of the first entry containing `width`.
    pub fn find(&self, width: u16) -> Option<usize> {
        self.entries.iter().position(|e| e.contains(width)).map(|i| i + 1)
    }

    /// Width synthesised for the 1-based entry `index`: the midpoint, or the
    /// closest width a lower entry does not claim.
    pub fn representative(&self, index: usize) -> Option<u16> {
        index
            .checked_sub(1)
            .and_then(|i| self.representatives.get(i))
            .copied()
    }
}

fn nearest_unclaimed(entry: &PwEntry, claimed: impl Fn(u16) -> bool) -> Option<u16> {
    let mid = entry.midpoint();
    if !claimed(mid) {
        return Some(mid);
    }
    let span = entry.max - entry.min;
    for d in 1..=span {
        if let Some(w) = mid.checked_sub(d).filter(|w| *w >= entry.min) {
            if !claimed(w) {
                return Some(w);
            }
        }
        if let Some(w) = mid.checked_add(d).filter(|w| *w <= entry.max) {
            if !claimed(w) {
                return Some(w);
            }
        }
    }
    None
}

// ═══════════════════════════════════════════════════════════════
//  Condition lookup
// ═══════════════════════════════════════════════════════════════

/// `[startIndex, count]` window into the condition table (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupWindow {
    pub start: u8,
    pub count: u8,
}

impl LookupWindow {
    pub fn contains(&self, index: usize) -> bool {
        let start = usize::from(self.start);
        index >= start && index < start + usize::from(self.count)
    }

    /// Table index for `level` (1-based), clamped to the window.
    pub fn index_for(&self, level: u8) -> usize {
        let level = level.clamp(1, self.count.max(1));
        usize::from(self.start) + usize::from(level) - 1
    }

    /// Level of a table index inside the window.
    pub fn level_of(&self, index: usize) -> u8 {
        (index + 1 - usize::from(self.start)) as u8
    }

    fn last(&self) -> usize {
        usize::from(self.start) + usize::from(self.count) - 1
    }

    fn overlaps(&self, other: &LookupWindow) -> bool {
        usize::from(self.start) <= other.last() && usize::from(other.start) <= self.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionLookup {
    /// Slot (1..=5) holding the condition table.
    pub slot: u8,
    pub trouble: Option<LookupWindow>,
    pub alarm: Option<LookupWindow>,
    pub test: Option<LookupWindow>,
}

impl Default for ConditionLookup {
    fn default() -> Self {
        Self {
            slot: 4,
            trouble: None,
            alarm: None,
            test: None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Command sequences
// ═══════════════════════════════════════════════════════════════

/// Mask/value pair over the control-bit history of a device.
/// The last pattern in the source list is the most recent poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPattern {
    pub mask: u32,
    pub value: u32,
    pub polls: u8,
}

impl ControlPattern {
    /// Parse `["0xx", "1x1"]`-style patterns. `None` on malformed input.
    pub fn parse<S: AsRef<str>>(seq: &[S]) -> Option<Self> {
        if seq.is_empty() || seq.len() > MAX_SEQUENCE_POLLS {
            return None;
        }
        let mut mask = 0u32;
        let mut value = 0u32;
        for bits in seq {
            let bits = bits.as_ref().as_bytes();
            if bits.len() != 3 {
                return None;
            }
            for b in bits {
                mask <<= 1;
                value <<= 1;
                match b {
                    b'x' | b'X' => {}
                    b'1' => {
                        mask |= 1;
                        value |= 1;
                    }
                    b'0' => mask |= 1,
                    _ => return None,
                }
            }
        }
        Some(Self {
            mask,
            value,
            polls: seq.len() as u8,
        })
    }

    pub fn matches(&self, history: u32) -> bool {
        history & self.mask == self.value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandSequence {
    pub tag: String,
    pub pattern: ControlPattern,
    pub script: Script,
}

// ═══════════════════════════════════════════════════════════════
//  Device model
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceModel {
    pub name: String,
    pub kind: DeviceKind,
    pub description: String,
    pub sim: String,
    tables: [Option<PulseWidthTable>; PW_SLOTS],
    lookup: Option<ConditionLookup>,
    pub commands: Vec<CommandSequence>,
}

impl DeviceModel {
    /// Table of a 1-based slot.
    pub fn table(&self, slot: u8) -> Option<&PulseWidthTable> {
        usize::from(slot)
            .checked_sub(1)
            .and_then(|i| self.tables.get(i))
            .and_then(Option::as_ref)
    }

    pub fn is_driven(&self, slot: u8) -> bool {
        self.table(slot).is_some()
    }

    /// Declared lookup, or the implicit `pw4` lookup with no windows.
    pub fn lookup(&self) -> ConditionLookup {
        self.lookup.unwrap_or_default()
    }

    pub fn has_lookup(&self) -> bool {
        self.lookup.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Load records
// ═══════════════════════════════════════════════════════════════

/// One model record as written in the catalog file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelRecord {
    pub model: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub sim: String,
    #[serde(default)]
    pub pw1: Option<Value>,
    #[serde(default)]
    pub pw2: Option<Value>,
    #[serde(default)]
    pub pw3: Option<Value>,
    #[serde(default)]
    pub pw4: Option<Value>,
    #[serde(default)]
    pub pw5: Option<Value>,
    #[serde(default)]
    pub lut: Option<LookupRecord>,
    #[serde(default)]
    pub cmd: Vec<CommandRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LookupRecord {
    #[serde(default = "default_lookup_slot")]
    pub pw: u8,
    #[serde(default)]
    pub tbl: Option<[u8; 2]>,
    #[serde(default)]
    pub alm: Option<[u8; 2]>,
    #[serde(default)]
    pub tst: Option<[u8; 2]>,
}

fn default_lookup_slot() -> u8 {
    4
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandRecord {
    pub tag: String,
    pub seq: Vec<String>,
    pub js: ScriptLines,
}

// ═══════════════════════════════════════════════════════════════
//  Catalog
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    models: Vec<Arc<DeviceModel>>,
    info: Option<Value>,
}

impl Catalog {
    /// Parse the object-with-repeated-keys catalog document.
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        let doc = OrderedObject::parse(text)?;
        let mut records = Vec::new();
        let mut info = None;
        for (position, (key, value)) in doc.iter().enumerate() {
            match DeviceKind::from_key(key) {
                Some(kind) => records.push((kind, json::record::<ModelRecord>(key, position, value)?)),
                None if key == "info" => info = Some(value.clone()),
                None => debug!("Catalog: ignoring top-level key '{}'", key),
            }
        }
        let mut catalog = load_catalog(records)?;
        catalog.info = info;
        Ok(catalog)
    }

    pub fn get(&self, kind: DeviceKind, name: &str) -> Option<Arc<DeviceModel>> {
        self.models
            .iter()
            .find(|m| m.kind == kind && m.name == name)
            .cloned()
    }

    pub fn models(&self) -> impl Iterator<Item = &Arc<DeviceModel>> {
        self.models.iter()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// The free-form `"info"` record, if the document carried one.
    pub fn info(&self) -> Option<&Value> {
        self.info.as_ref()
    }
}

/// Build a catalog from model records, validating every table, lookup and
/// command sequence.
pub fn load_catalog(
    entries: impl IntoIterator<Item = (DeviceKind, ModelRecord)>,
) -> Result<Catalog, CatalogError> {
    let mut seen = HashSet::new();
    let mut models = Vec::new();
    for (kind, record) in entries {
        if !seen.insert((kind, record.model.clone())) {
            return Err(CatalogError::DuplicateModel(record.model));
        }
        models.push(Arc::new(build_model(kind, record)?));
    }
    info!("Catalog: loaded {} models", models.len());
    Ok(Catalog { models, info: None })
}

fn build_model(kind: DeviceKind, record: ModelRecord) -> Result<DeviceModel, CatalogError> {
    let name = record.model;
    let raw = [record.pw1, record.pw2, record.pw3, record.pw4, record.pw5];
    let mut tables: [Option<PulseWidthTable>; PW_SLOTS] = Default::default();
    for (i, value) in raw.iter().enumerate() {
        let slot = (i + 1) as u8;
        if let Some(value) = value {
            tables[i] = Some(parse_table(&name, slot, value)?);
        }
    }

    let lookup = match record.lut {
        Some(lut) => Some(build_lookup(&name, &lut, &tables)?),
        None => None,
    };

    let mut commands = Vec::with_capacity(record.cmd.len());
    for cmd in record.cmd {
        let pattern = ControlPattern::parse(cmd.seq.as_slice()).ok_or_else(|| CatalogError::InvalidSequence {
            model: name.clone(),
            tag: cmd.tag.clone(),
        })?;
        let script = script::parse(&cmd.js.source()).map_err(|error| CatalogError::Script {
            context: format!("{kind} model '{name}' command '{}'", cmd.tag),
            error,
        })?;
        commands.push(CommandSequence {
            tag: cmd.tag,
            pattern,
            script,
        });
    }

    Ok(DeviceModel {
        name,
        kind,
        description: record.desc,
        sim: record.sim,
        tables,
        lookup,
        commands,
    })
}

fn parse_table(model: &str, slot: u8, value: &Value) -> Result<PulseWidthTable, CatalogError> {
    let invalid = |reason| CatalogError::InvalidTable {
        model: model.to_string(),
        slot,
        reason,
    };
    let entries = match value {
        Value::Array(items) if items.is_empty() => return Err(invalid("empty table")),
        Value::Array(items) if items[0].is_array() => items
            .iter()
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?,
        other => vec![parse_entry(other).map_err(invalid)?],
    };
    PulseWidthTable::new(entries).map_err(|index| CatalogError::OverlappingRanges {
        model: model.to_string(),
        slot,
        index,
    })
}

/// `[min, max]`, `[value]`, `value`, `[label, min, max]` or `[label, value]`.
fn parse_entry(value: &Value) -> Result<PwEntry, &'static str> {
    let width = |v: &Value| -> Result<u16, &'static str> {
        v.as_u64()
            .and_then(|w| u16::try_from(w).ok())
            .ok_or("width must be an integer in 0..=65535")
    };
    let items = match value {
        Value::Number(_) => {
            let w = width(value)?;
            return Ok(PwEntry::range(w, w));
        }
        Value::Array(items) => items.as_slice(),
        _ => return Err("entry must be a number or a list"),
    };
    let (label, bounds) = match items.split_first() {
        Some((Value::String(label), rest)) => (Some(label.clone()), rest),
        _ => (None, items),
    };
    let (min, max) = match bounds {
        [v] => {
            let w = width(v)?;
            (w, w)
        }
        [lo, hi] => (width(lo)?, width(hi)?),
        _ => return Err("entry must hold one value or a min/max pair"),
    };
    if min > max {
        return Err("entry minimum above maximum");
    }
    Ok(PwEntry { label, min, max })
}

fn build_lookup(
    model: &str,
    lut: &LookupRecord,
    tables: &[Option<PulseWidthTable>; PW_SLOTS],
) -> Result<ConditionLookup, CatalogError> {
    let invalid = |reason| CatalogError::InvalidLookup {
        model: model.to_string(),
        reason,
    };
    if !(1..=PW_SLOTS as u8).contains(&lut.pw) {
        return Err(invalid("pw slot must be 1..5"));
    }
    let table = tables[usize::from(lut.pw) - 1]
        .as_ref()
        .ok_or_else(|| invalid("pw slot not populated"))?;

    let window = |raw: Option<[u8; 2]>| -> Result<Option<LookupWindow>, CatalogError> {
        let Some([start, count]) = raw else {
            return Ok(None);
        };
        let w = LookupWindow { start, count };
        if count == 0 {
            return Err(invalid("window count is zero"));
        }
        if start < 2 {
            return Err(invalid("window covers the Normal entry"));
        }
        if w.last() > table.len() {
            return Err(invalid("window runs past the end of the table"));
        }
        Ok(Some(w))
    };

    let lookup = ConditionLookup {
        slot: lut.pw,
        trouble: window(lut.tbl)?,
        alarm: window(lut.alm)?,
        test: window(lut.tst)?,
    };
    let windows: Vec<_> = [lookup.trouble, lookup.alarm, lookup.test]
        .into_iter()
        .flatten()
        .collect();
    for (i, a) in windows.iter().enumerate() {
        if windows[i + 1..].iter().any(|b| a.overlaps(b)) {
            return Err(invalid("windows overlap"));
        }
    }
    Ok(lookup)
}
