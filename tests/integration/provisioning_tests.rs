//! Instance config provisioning on the demo loop.

use slcsim::catalog::{Catalog, DeviceKind};
use slcsim::error::{CatalogError, Error};
use slcsim::provision::parse_instance_config;
use slcsim::registry::Registry;
use slcsim::script::ScriptBinding;

use slcsim::drivers::switch::SwitchPosition;

use super::mock_io::{CATALOG, CONFIG, Harness, LEGACY_CONFIG};

#[test]
fn demo_loop_is_provisioned() {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    let instance = parse_instance_config(CONFIG).unwrap();
    let mut registry = Registry::new();
    let report = instance.provision(&catalog, &mut registry);
    assert_eq!(report.provisioned, 32);
    assert!(report.skipped.is_empty());

    let heat = registry.get(DeviceKind::Sensor, 25).unwrap();
    assert_eq!(heat.model.name, "5251H");
    assert_eq!(heat.tag, "Board 2 Heat");
    assert_eq!(heat.overrides.bias_pct, 105);
    assert!(heat.in_group(3));
    assert!(!registry.get(DeviceKind::Module, 6).unwrap().enabled);
    assert!(!registry.is_provisioned(DeviceKind::Sensor, 27));
}

#[test]
fn demo_program_links_every_binding() {
    let h = Harness::demo();
    let program = h.sim.runtime().program();
    for binding in [
        ScriptBinding::Init,
        ScriptBinding::Timer(1),
        ScriptBinding::Timer(2),
        ScriptBinding::UserEvent(1),
        ScriptBinding::Named("evacuate".into()),
    ] {
        assert!(program.contains(&binding), "{binding}");
    }
    assert!(!program.contains(&ScriptBinding::Timer(3)));
    // 6 switch edges, 4 misc, 3 triggers, 1 label, 3 heat detector commands.
    assert_eq!(program.len(), 17);
}

#[test]
fn unknown_goto_label_fails_the_load() {
    let config = r#"{ "misc": { "usr2": ["goto nowhere;"] } }"#;
    let err = slcsim::SimService::from_sources(CATALOG, config, Default::default()).err();
    assert!(matches!(
        err,
        Some(Error::Catalog(CatalogError::UnresolvedLabel { ref label, .. })) if label == "nowhere"
    ));
}

#[test]
fn bad_records_are_skipped_not_fatal() {
    let config = r#"{
        "sensor": { "model": "nope", "addr": [1] },
        "sensor": { "model": "2251B", "addr": [161] },
        "sensor": { "model": "2251B", "addr": [2] }
    }"#;
    let h = Harness::with_config(config);
    let devices = h.sim.snapshot().devices;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].address, 2);
}

#[test]
fn hand_edited_loop_file_loads_and_runs() {
    let instance = parse_instance_config(LEGACY_CONFIG).unwrap();
    assert_eq!(instance.devices.len(), 29);
    // 6 switch edges, init + 4 timers, 1 trigger.
    assert_eq!(instance.scripts.len(), 12);

    // Models missing from the demo catalog are skipped, the rest run.
    let mut h = Harness::with_config(LEGACY_CONFIG);
    assert!(h.panel.console.contains("Custom script 1"));
    assert!(h.sim.registry().is_provisioned(DeviceKind::Sensor, 17));
    assert!(!h.sim.registry().is_provisioned(DeviceKind::Sensor, 77));

    h.panel.set(2, SwitchPosition::Down);
    h.run_ms(1200);
    assert!(h.panel.console.contains("sensor 1 in alarm"), "{}", h.panel.console);
}
