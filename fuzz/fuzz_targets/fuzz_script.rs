//! Fuzz target: script parser and interpreter
//!
//! Parses arbitrary text as a script. Sources that parse are installed as
//! the `init` block of a one-sensor simulation and run for a few cycles;
//! the step budget keeps runaway loops finite, so any panic is a bug.
//!
//! cargo fuzz run fuzz_script

#![no_main]

use libfuzzer_sys::fuzz_target;
use slcsim::SimService;
use slcsim::app::events::AppEvent;
use slcsim::app::ports::{ConsolePort, EventSink, SwitchPort};
use slcsim::config::EngineConfig;
use slcsim::drivers::switch::SwitchPosition;

const CATALOG: &str = r#"{
    "sensor": { "model": "S", "pw4": [["Normal", 600, 1000], ["Trouble", 100, 200], ["Alarm", 1200, 1500]],
                "lut": { "tbl": [2, 1], "alm": [3, 1] } }
}"#;

struct Null;

impl SwitchPort for Null {
    fn read_switch(&mut self, _switch: u8) -> SwitchPosition {
        SwitchPosition::Off
    }
}

impl ConsolePort for Null {
    fn print(&mut self, _text: &str) {}
}

impl EventSink for Null {
    fn emit(&mut self, _event: &AppEvent) {}
}

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };
    if slcsim::script::parse(source).is_err() {
        return;
    }

    let Ok(script) = serde_json::to_string(source) else {
        return;
    };
    let instance = format!(
        r#"{{ "sensor": {{ "model": "S", "addr": [1, 2], "group": 1 }}, "misc": {{ "init": {script}, "tmr1": {script} }} }}"#
    );
    let Ok(mut sim) = SimService::from_sources(CATALOG, &instance, EngineConfig::default()) else {
        return;
    };
    let mut io = Null;
    let mut sink = Null;
    sim.start(&mut io, &mut sink);
    for _ in 0..8 {
        sim.cycle(250, &mut io, &mut sink);
    }
});
