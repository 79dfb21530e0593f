//! Scheduler behaviour on the demo loop: timers, switches, cascades and
//! the control surface.

use super::mock_io::Harness;

use slcsim::app::commands::ControlCommand;
use slcsim::app::events::AppEvent;
use slcsim::catalog::DeviceKind;
use slcsim::codec::Condition;
use slcsim::config::EngineConfig;
use slcsim::drivers::switch::SwitchPosition;
use slcsim::registry::SlotRef;

fn condition(h: &Harness, slot: SlotRef) -> Option<Condition> {
    h.sim.slot_condition(slot)
}

#[test]
fn init_banner_is_printed_once() {
    let mut h = Harness::demo();
    h.run_ms(200);
    assert_eq!(h.panel.console.matches("Demo loop").count(), 1);
    assert!(matches!(h.sink.events.first(), Some(AppEvent::Started { .. })));
}

#[test]
fn timer_chain_walks_addresses() {
    let mut h = Harness::demo();
    h.panel.set(2, SwitchPosition::Down);
    // Debounce, then tmr1 after one second.
    h.run_ms(1100);
    assert_eq!(condition(&h, SlotRef::sensor(2)), Some(Condition::Alarm(3)));
    assert!(h.sim.indicators().is_on(4));
    assert!(h.panel.console.contains("sensor 2 in alarm"));

    // tmr2 clears two seconds later and re-arms tmr1.
    h.run_ms(2000);
    assert_eq!(condition(&h, SlotRef::sensor(2)), Some(Condition::Normal));
    assert!(h.panel.console.contains("sensor 2 cleared"));
    h.run_ms(1000);
    assert_eq!(condition(&h, SlotRef::sensor(3)), Some(Condition::Alarm(3)));
}

#[test]
fn switch_up_disables_every_slot() {
    let mut h = Harness::demo();
    h.panel.set(1, SwitchPosition::Up);
    h.run_ms(100);
    assert!(h.sim.indicators().is_on(3));
    assert!(h.sim.registry().iter().all(|d| !d.enabled));

    // Disabled slots ignore forced changes.
    h.command(ControlCommand::SetAlarm {
        kind: DeviceKind::Sensor,
        address: 1,
        level: 1,
    })
    .unwrap();
    assert_eq!(condition(&h, SlotRef::sensor(1)), Some(Condition::Normal));

    h.panel.set(1, SwitchPosition::Off);
    h.run_ms(100);
    assert!(!h.sim.indicators().is_on(3));
    assert!(h.sim.registry().iter().all(|d| d.enabled));
}

#[test]
fn short_glitch_is_debounced() {
    let mut h = Harness::demo();
    h.panel.set(1, SwitchPosition::Down);
    h.run_ms(30);
    h.panel.set(1, SwitchPosition::Off);
    h.run_ms(200);
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::SwitchChanged { .. })), 0);
    assert_eq!(condition(&h, SlotRef::sensor(1)), Some(Condition::Normal));
}

#[test]
fn module_alarm_jumps_to_labelled_script_and_cascades() {
    let mut h = Harness::demo();
    h.command(ControlCommand::SetAlarm {
        kind: DeviceKind::Module,
        address: 1,
        level: 1,
    })
    .unwrap();
    h.cycle();
    // goto evacuate -> usr(1) -> group 3 trouble, all within one cycle.
    assert_eq!(h.sim.indicators().flash_period(1), Some(250));
    assert!(h.panel.console.contains("group 3 in trouble"));
    for address in 21..=26 {
        assert_eq!(condition(&h, SlotRef::sensor(address)), Some(Condition::Trouble(1)));
    }
    assert_eq!(condition(&h, SlotRef::sensor(20)), Some(Condition::Normal));
}

#[test]
fn trigger_reports_this_state() {
    let mut h = Harness::demo();
    h.command(ControlCommand::SetAlarm {
        kind: DeviceKind::Sensor,
        address: 17,
        level: 2,
    })
    .unwrap();
    h.cycle();
    assert!(h.panel.console.contains("sensor 17 changed state 1"));
    assert_eq!(h.sim.indicators().flash_period(0), Some(500));
}

#[test]
fn stop_and_resume() {
    let mut h = Harness::demo();
    h.command(ControlCommand::Stop).unwrap();
    h.panel.set(1, SwitchPosition::Down);
    h.run_ms(500);
    assert_eq!(h.panel.reads, 0);
    assert_eq!(h.sim.now_ms(), 0);

    h.command(ControlCommand::Resume).unwrap();
    h.run_ms(100);
    assert_eq!(condition(&h, SlotRef::sensor(1)), Some(Condition::Alarm(1)));
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::Halted)), 1);
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::Resumed)), 1);
}

#[test]
fn restart_cancels_timers_and_reruns_init() {
    let mut h = Harness::demo();
    h.panel.set(2, SwitchPosition::Down);
    h.run_ms(100);
    assert!(h.sim.timers().is_armed(1));

    h.command(ControlCommand::Restart).unwrap();
    assert!(!h.sim.timers().is_armed(1));
    assert_eq!(h.panel.console.matches("Demo loop").count(), 2);
    h.run_ms(2000);
    assert_eq!(condition(&h, SlotRef::sensor(2)), Some(Condition::Normal));
}

#[test]
fn heat_detector_command_sequences() {
    let mut h = Harness::demo();
    let poll = |ctl| ControlCommand::Poll {
        kind: DeviceKind::Sensor,
        address: 25,
        ctl,
    };
    h.command(poll(0b000)).unwrap();
    let pulses = h.command(poll(0b010)).unwrap().unwrap();
    assert_eq!(condition(&h, SlotRef::sensor(25)), Some(Condition::RemoteTest));
    // Remote test window, scaled by the 105% timing bias.
    assert_eq!(pulses[3], 3465);

    h.command(poll(0b101)).unwrap();
    h.command(poll(0b111)).unwrap();
    assert_eq!(condition(&h, SlotRef::sensor(25)), Some(Condition::Normal));
    assert_eq!(
        h.sink.count(|e| matches!(e, AppEvent::PollAnswered { command: Some(tag), .. } if tag == "Remote Test off")),
        1
    );
}

#[test]
fn disabled_module_does_not_answer() {
    let mut h = Harness::demo();
    let poll = ControlCommand::Poll {
        kind: DeviceKind::Module,
        address: 5,
        ctl: 0,
    };
    assert_eq!(h.command(poll.clone()).unwrap(), None);
    h.command(ControlCommand::Enable {
        kind: DeviceKind::Module,
        address: 5,
    })
    .unwrap();
    assert!(h.command(poll).unwrap().is_some());
}

#[test]
fn reported_feedback_becomes_trouble() {
    let mut h = Harness::demo();
    let report = |pulses| ControlCommand::ReportPulses {
        kind: DeviceKind::Sensor,
        address: 3,
        pulses,
    };
    h.command(report([300, 300, 600, 2000, 600])).unwrap();
    assert_eq!(condition(&h, SlotRef::sensor(3)), Some(Condition::Alarm(2)));
    h.command(report([300, 300, 600, 5000, 600])).unwrap();
    assert_eq!(condition(&h, SlotRef::sensor(3)), Some(Condition::Trouble(1)));
}

#[test]
fn budget_defers_cascades() {
    let engine = EngineConfig {
        max_dispatch_per_cycle: 1,
        ..Default::default()
    };
    let mut h = Harness::with_engine(super::mock_io::CONFIG, engine);
    h.command(ControlCommand::SetAlarm {
        kind: DeviceKind::Module,
        address: 2,
        level: 1,
    })
    .unwrap();
    h.cycle();
    // The trigger jumped into `evacuate`; the usr1 it raised waits.
    assert_eq!(h.sim.indicators().flash_period(1), Some(250));
    assert!(!h.panel.console.contains("group 3 in trouble"));
    assert_eq!(h.sink.count(|e| matches!(e, AppEvent::DispatchDeferred { pending: 1 })), 1);
    h.cycle();
    assert!(h.panel.console.contains("group 3 in trouble"));
}
