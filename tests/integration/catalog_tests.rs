//! Catalog loading against the demo file and malformed documents.

use slcsim::catalog::{Catalog, DeviceKind};
use slcsim::codec::{self, Condition, PulseOverrides};
use slcsim::error::CatalogError;

use super::mock_io::CATALOG;

#[test]
fn demo_catalog_loads_every_model() {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    assert_eq!(catalog.len(), 5);
    assert!(catalog.info().is_some());
    for (kind, name) in [
        (DeviceKind::Sensor, "2251B"),
        (DeviceKind::Sensor, "1251"),
        (DeviceKind::Sensor, "5251H"),
        (DeviceKind::Module, "M500M"),
        (DeviceKind::Module, "M500R"),
    ] {
        assert!(catalog.get(kind, name).is_some(), "{kind} {name}");
    }
    assert_eq!(catalog.get(DeviceKind::Sensor, "5251H").unwrap().commands.len(), 3);
}

#[test]
fn every_demo_model_round_trips_its_lookup() {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    for model in catalog.models() {
        let lookup = model.lookup();
        let mut conditions = vec![Condition::Normal];
        if let Some(w) = lookup.trouble {
            conditions.extend((1..=w.count).map(Condition::Trouble));
        }
        if let Some(w) = lookup.alarm {
            conditions.extend((1..=w.count).map(Condition::Alarm));
        }
        if lookup.test.is_some() {
            conditions.push(Condition::RemoteTest);
        }
        for c in conditions {
            let pulses = codec::encode(model, c).unwrap();
            assert_eq!(codec::decode(model, &pulses), Ok(c), "{} {c}", model.name);
        }
    }
}

#[test]
fn unrepresentable_condition_answers_resting_pulses() {
    let catalog = Catalog::from_json(CATALOG).unwrap();
    let relay = catalog.get(DeviceKind::Module, "M500R").unwrap();
    let pulses = codec::synthesize(&relay, Condition::Alarm(1), &PulseOverrides::default());
    assert_eq!(pulses, codec::resting_pulses(&relay));
    assert_eq!(codec::decode(&relay, &pulses), Ok(Condition::Normal));
}

#[test]
fn hand_edited_catalog_syntax_is_accepted() {
    let catalog = Catalog::from_json(
        "{ 'sensor': { 'model': 'X', 'pw4': [['Normal', 100, 200],], }, // spare\n }",
    )
    .unwrap();
    assert!(catalog.get(DeviceKind::Sensor, "X").is_some());
}

#[test]
fn malformed_documents_are_rejected() {
    let err = Catalog::from_json(r#"{ "sensor": { "model": } }"#).unwrap_err();
    assert!(matches!(err, CatalogError::Parse(_)));
}

#[test]
fn duplicate_model_names_fail_the_load() {
    let doc = r#"{
        "sensor": { "model": "A", "pw4": [[100, 200]] },
        "sensor": { "model": "A", "pw4": [[100, 200]] }
    }"#;
    assert_eq!(
        Catalog::from_json(doc).unwrap_err(),
        CatalogError::DuplicateModel("A".into())
    );
}

#[test]
fn broken_command_script_fails_the_load() {
    let doc = r#"{
        "sensor": {
            "model": "A",
            "pw4": [[100, 200]],
            "cmd": [ { "tag": "bad", "seq": ["1xx"], "js": ["this.led = ;"] } ]
        }
    }"#;
    assert!(matches!(
        Catalog::from_json(doc),
        Err(CatalogError::Script { .. })
    ));
}
