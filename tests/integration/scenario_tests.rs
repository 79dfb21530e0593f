//! End-to-end scenarios on small hand-written loops.

use super::mock_io::Harness;

use slcsim::app::commands::ControlCommand;
use slcsim::app::events::AppEvent;
use slcsim::catalog::{Catalog, DeviceKind};
use slcsim::codec::{self, Condition};
use slcsim::drivers::switch::SwitchPosition;
use slcsim::registry::SlotRef;

use super::mock_io::CATALOG;

#[test]
fn photo_2251b_decodes_normal_and_trouble() {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    let model = catalog.get(DeviceKind::Sensor, "2251B").unwrap();
    assert_eq!(codec::decode(&model, &[300, 300, 600, 900, 600]), Ok(Condition::Normal));
    assert_eq!(codec::decode(&model, &[300, 300, 600, 300, 600]), Ok(Condition::Trouble(1)));
}

#[test]
fn switch_down_raises_alarm_on_sensor_1() {
    let mut h = Harness::with_config(
        r#"{
            "sensor": { "model": "1251", "addr": [1] },
            "sw1": { "down": ["sensor[1].alarm = 1;"] }
        }"#,
    );
    h.panel.set(1, SwitchPosition::Down);
    h.run_ms(100);

    let snap = h.sim.snapshot();
    let s1 = snap
        .devices
        .iter()
        .find(|d| d.kind == DeviceKind::Sensor && d.address == 1)
        .unwrap();
    assert_eq!(s1.model, "1251");
    assert_eq!(s1.condition, Condition::Alarm(1));
}

#[test]
fn trigger_on_sensor_17_flashes_indicator_0() {
    let mut h = Harness::with_config(
        r#"{
            "sensor": { "model": "2251B", "addr": [16, 17, 18] },
            "trigger": { "sensor": true, "addr": 17, "script": ["led[0].flash(500);"] }
        }"#,
    );

    for address in [16, 18] {
        h.command(ControlCommand::SetTrouble {
            kind: DeviceKind::Sensor,
            address,
            level: 1,
        })
        .unwrap();
        h.cycle();
        assert_eq!(h.sim.indicators().flash_period(0), None, "address {address}");
    }

    h.command(ControlCommand::SetTrouble {
        kind: DeviceKind::Sensor,
        address: 17,
        level: 1,
    })
    .unwrap();
    h.cycle();
    assert_eq!(h.sim.indicators().flash_period(0), Some(500));
    assert!(h.sim.indicators().is_lit(0));
}

#[test]
fn trigger_on_module_is_separate_from_sensor() {
    let mut h = Harness::with_config(
        r#"{
            "sensor": { "model": "2251B", "addr": [5] },
            "module": { "model": "M500M", "addr": [5] },
            "trigger": { "module": true, "addr": 5, "script": ["led[1].on = true;"] }
        }"#,
    );
    h.command(ControlCommand::SetAlarm {
        kind: DeviceKind::Sensor,
        address: 5,
        level: 1,
    })
    .unwrap();
    h.cycle();
    assert!(!h.sim.indicators().is_on(1));

    h.command(ControlCommand::SetAlarm {
        kind: DeviceKind::Module,
        address: 5,
        level: 1,
    })
    .unwrap();
    h.cycle();
    assert!(h.sim.indicators().is_on(1));
    assert_eq!(
        h.sink.count(|e| matches!(e, AppEvent::TriggerFired { slot } if *slot == SlotRef::module(5))),
        1
    );
}

#[test]
fn script_writes_rearm_trigger_without_change() {
    let mut h = Harness::with_config(
        r#"{
            "sensor": { "model": "2251B", "addr": [9] },
            "misc": { "usr1": ["sensor[9].alarm = 2;"] },
            "trigger": { "sensor": true, "addr": 9, "script": ["var hits; hits++;"] }
        }"#,
    );
    for _ in 0..3 {
        h.command(ControlCommand::RaiseUser { event: 1 }).unwrap();
        h.cycle();
    }
    let trigger = slcsim::script::ScriptBinding::Trigger(SlotRef::sensor(9));
    assert_eq!(
        h.sim.runtime().variable(&trigger, "hits"),
        Some(&slcsim::script::Value::Int(3))
    );
}

#[test]
fn wide_cascade_delivers_every_trigger() {
    let addrs = (1..=150).map(|a| a.to_string()).collect::<Vec<_>>().join(", ");
    let config = format!(
        r#"{{
            "sensor": {{ "model": "2251B", "addr": [{addrs}] }},
            "misc": {{ "usr1": ["for (var i = 1; i <= 150; i++) {{ sensor[i].alarm = 1; }}"] }},
            "trigger": {{ "sensor": true, "addr": [{addrs}], "script": ["var hits; hits++;"] }}
        }}"#
    );
    let mut h = Harness::with_config(&config);
    h.command(ControlCommand::RaiseUser { event: 1 }).unwrap();
    h.run_ms(1000);

    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::TriggerFired { .. })), 150);
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::DispatchDropped { .. })), 0);
    assert_eq!(h.sim.snapshot().dropped_dispatches, 0);
    let last = slcsim::script::ScriptBinding::Trigger(SlotRef::sensor(150));
    assert_eq!(
        h.sim.runtime().variable(&last, "hits"),
        Some(&slcsim::script::Value::Int(1))
    );
}
