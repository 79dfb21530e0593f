//! Property and fuzz-style tests for the codec, registry, timers and the
//! script front end.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use slcsim::app::ports::TimerDelegate;
use slcsim::catalog::{Catalog, DeviceKind, DeviceModel, ModelRecord, load_catalog};
use slcsim::codec::{self, Condition};
use slcsim::registry::Registry;
use slcsim::script::{self, ScriptBinding, Value};
use slcsim::timer::TimerBank;

// ── Generators ────────────────────────────────────────────────

/// A pulse-width table of disjoint ranges plus trouble/alarm/test window
/// sizes that fit behind the Normal entry.
fn table_and_windows() -> impl Strategy<Value = (Vec<(u16, u16)>, u8, u8, u8)> {
    prop::collection::vec((1u16..50, 0u16..200), 2..=8).prop_flat_map(|spans| {
        let mut ranges = Vec::with_capacity(spans.len());
        let mut next = 100u16;
        for (gap, len) in spans {
            let min = next + gap;
            ranges.push((min, min + len));
            next = min + len;
        }
        let spare = (ranges.len() - 1) as u8;
        (Just(ranges), 0..=spare).prop_flat_map(move |(ranges, trouble)| {
            (Just(ranges), Just(trouble), 0..=spare - trouble).prop_flat_map(move |(ranges, trouble, alarm)| {
                let test_max = u8::from(spare - trouble - alarm > 0);
                (Just(ranges), Just(trouble), Just(alarm), 0..=test_max)
            })
        })
    })
}

fn model_from(ranges: &[(u16, u16)], trouble: u8, alarm: u8, test: u8) -> Arc<DeviceModel> {
    let mut lut = json!({ "pw": 4 });
    if trouble > 0 {
        lut["tbl"] = json!([2, trouble]);
    }
    if alarm > 0 {
        lut["alm"] = json!([2 + trouble, alarm]);
    }
    if test > 0 {
        lut["tst"] = json!([2 + trouble + alarm, 1]);
    }
    let pw4: Vec<_> = ranges.iter().map(|(lo, hi)| json!([lo, hi])).collect();
    let record: ModelRecord = serde_json::from_value(json!({
        "model": "P",
        "pw1": [270, 330],
        "pw4": pw4,
        "lut": lut
    }))
    .unwrap();
    let catalog = load_catalog([(DeviceKind::Sensor, record)]).unwrap();
    catalog.get(DeviceKind::Sensor, "P").unwrap()
}

fn two_model_catalog() -> Catalog {
    Catalog::from_json(
        r#"{
            "sensor": { "model": "A", "pw4": [["Normal", 800, 1000], ["Trouble", 100, 200]], "lut": { "tbl": [2, 1] } },
            "sensor": { "model": "B", "pw4": [["Normal", 500, 600], ["Alarm", 2000, 2200]], "lut": { "alm": [2, 1] } },
            "module": { "model": "A", "pw4": [["Normal", 800, 1000]] }
        }"#,
    )
    .unwrap()
}

struct Fired(Vec<u8>);

impl TimerDelegate for Fired {
    fn on_timer_expired(&mut self, id: u8, _event: ScriptBinding) {
        self.0.push(id);
    }
}

// ── Codec ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn encode_then_decode_is_identity((ranges, trouble, alarm, test) in table_and_windows()) {
        let model = model_from(&ranges, trouble, alarm, test);
        let mut conditions = vec![Condition::Normal];
        conditions.extend((1..=trouble).map(Condition::Trouble));
        conditions.extend((1..=alarm).map(Condition::Alarm));
        if test > 0 {
            conditions.push(Condition::RemoteTest);
        }
        for c in conditions {
            let pulses = codec::encode(&model, c).unwrap();
            prop_assert_eq!(codec::decode(&model, &pulses), Ok(c));
        }
    }

    #[test]
    fn decode_never_panics(pulses in prop::array::uniform5(any::<u16>())) {
        let model = model_from(&[(600, 1000), (100, 200), (2000, 2400)], 1, 1, 0);
        let _ = codec::decode(&model, &pulses);
    }
}

// ── Registry ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn last_provisioning_write_wins(
        writes in prop::collection::vec((1u32..=160, prop::bool::ANY, prop::bool::ANY), 1..200)
    ) {
        let catalog = two_model_catalog();
        let mut registry = Registry::new();
        let mut expected = vec![None; 161];
        for (i, (addr, use_b, enabled)) in writes.iter().enumerate() {
            let name = if *use_b { "B" } else { "A" };
            let model = catalog.get(DeviceKind::Sensor, name).unwrap();
            let tag = i.to_string();
            registry.provision(DeviceKind::Sensor, &[*addr], model, &[], *enabled, &tag).unwrap();
            expected[*addr as usize] = Some((name, tag, *enabled));
        }
        for addr in 1..=160u32 {
            match &expected[addr as usize] {
                Some((name, tag, enabled)) => {
                    let dev = registry.get(DeviceKind::Sensor, addr).unwrap();
                    prop_assert_eq!(dev.model.name.as_str(), *name);
                    prop_assert_eq!(&dev.tag, tag);
                    prop_assert_eq!(dev.enabled, *enabled);
                    prop_assert_eq!(dev.condition(), Condition::Normal);
                }
                None => prop_assert!(!registry.is_provisioned(DeviceKind::Sensor, addr)),
            }
            prop_assert!(!registry.is_provisioned(DeviceKind::Module, addr));
        }
    }

    #[test]
    fn disabled_slot_ignores_forced_changes(
        ops in prop::collection::vec((0u8..4, 0u8..8, prop::bool::ANY), 1..50),
        addr in 1u32..=160
    ) {
        let catalog = two_model_catalog();
        let mut registry = Registry::new();
        let model = catalog.get(DeviceKind::Sensor, "B").unwrap();
        registry.provision(DeviceKind::Sensor, &[addr], model, &[], false, "").unwrap();
        for (op, level, flag) in ops {
            let applied = match op {
                0 => registry.set_alarm(DeviceKind::Sensor, addr, level, flag),
                1 => registry.set_trouble(DeviceKind::Sensor, addr, level, flag),
                2 => registry.set_remote_test(DeviceKind::Sensor, addr, flag, flag),
                _ => registry.set_condition(DeviceKind::Sensor, addr, Condition::Alarm(level), flag),
            }
            .unwrap();
            prop_assert!(!applied);
        }
        prop_assert_eq!(registry.get(DeviceKind::Sensor, addr).unwrap().condition(), Condition::Normal);
        prop_assert!(registry.take_changes().is_empty());
    }
}

// ── Timers ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn timer_fires_exactly_once(id in 1u8..=4, duration in 1u32..1_000_000, extra in prop::collection::vec(0u32..10_000, 0..5)) {
        let mut bank = TimerBank::new();
        let mut fired = Fired(Vec::new());
        prop_assert!(bank.arm(id, duration, ScriptBinding::Timer(id)));
        bank.tick(duration - 1, &mut fired);
        prop_assert!(fired.0.is_empty());
        bank.tick(1, &mut fired);
        prop_assert_eq!(&fired.0, &vec![id]);
        bank.tick(0, &mut fired);
        for e in extra {
            bank.tick(e, &mut fired);
        }
        prop_assert_eq!(fired.0.len(), 1);
        prop_assert!(!bank.is_armed(id));
    }
}

// ── Script front end ──────────────────────────────────────────

proptest! {
    #[test]
    fn parser_never_panics(source in "[ -~\n\t]{0,200}") {
        let _ = script::parse(&source);
    }

    #[test]
    fn parser_accepts_generated_assignments(
        name in "[a-z][a-z0-9_]{0,8}",
        value in 0..i32::MAX
    ) {
        prop_assume!(!matches!(
            name.as_str(),
            "var" | "if" | "else" | "while" | "for" | "break" | "continue" | "return" | "goto" | "true" | "false" | "this"
        ));
        let source = format!("var {name} = {value};");
        let parsed = script::parse(&source).unwrap();
        prop_assert_eq!(parsed.locals(), &[name][..]);
    }

    #[test]
    fn printf_never_panics(fmt in "[ -~]{0,40}", n in any::<i32>()) {
        let _ = script::format::printf(&fmt, &[Value::Int(n), Value::Str("s".into())]);
    }
}
