//! Application service: the simulation core.
//!
//! [`SimService`] owns the registry, timers, indicators, switches, script
//! runtime and dispatch queue.  It exposes a host-agnostic API; all I/O
//! flows through port traits injected at call sites, so the whole engine
//! runs under test with mock adapters.
//!
//! ```text
//!  SwitchPort  ──▶ ┌─────────────────────────────┐ ──▶ EventSink
//!                  │          SimService          │
//!  ConsolePort ◀── │ Registry · Timers · Runtime  │
//!                  └─────────────────────────────┘
//!                        ▲ ControlCommand
//! ```
//!
//! One call to [`SimService::cycle`] runs, in order:
//!
//! 1. advance the clock, tick indicators and timers, run expired timer
//!    scripts
//! 2. sample and debounce the switches, run edge scripts
//! 3. queue trigger scripts for every slot whose condition changed
//! 4. drain the dispatch queue breadth-first, at most
//!    `max_dispatch_per_cycle` entries; the rest waits for the next cycle

use log::{debug, info, warn};
use serde::Serialize;

use crate::catalog::{Catalog, DeviceKind};
use crate::codec::{Condition, Pulses};
use crate::config::EngineConfig;
use crate::drivers::indicator::{IndicatorBank, IndicatorState};
use crate::drivers::switch::SwitchDebouncer;
use crate::error::{Error, Fault, RegistryError, Result, ScriptError};
use crate::events::{Dispatch, DispatchQueue};
use crate::provision;
use crate::registry::{DeviceStatus, Registry, SlotRef};
use crate::script::{Machine, Program, Runtime, ScriptBinding, USER_EVENTS};
use crate::timer::TimerBank;

use super::commands::ControlCommand;
use super::events::AppEvent;
use super::ports::{ConsolePort, EventSink, SWITCH_COUNT, SwitchPort};

/// Control bit that lights the device LED when no command sequence matches.
const CTL_LED: u8 = 0b100;

/// Copy of the observable engine state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub halted: bool,
    pub time_ms: u64,
    pub devices: Vec<DeviceStatus>,
    pub indicators: Vec<IndicatorState>,
    pub pending_dispatches: usize,
    pub dropped_dispatches: u32,
}

// ───────────────────────────────────────────────────────────────
// SimService
// ───────────────────────────────────────────────────────────────

pub struct SimService {
    catalog: Catalog,
    registry: Registry,
    timers: TimerBank,
    indicators: IndicatorBank,
    switches: [SwitchDebouncer; SWITCH_COUNT as usize],
    runtime: Runtime,
    queue: DispatchQueue,
    config: EngineConfig,
    now_ms: u64,
    halted: bool,
}

impl SimService {
    /// Assemble the engine from loaded parts.
    ///
    /// Does **not** run `init`; call [`start`](Self::start) next.
    pub fn new(catalog: Catalog, registry: Registry, program: Program, config: EngineConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(Error::Config(errors));
        }
        let runtime = Runtime::new(program, config.max_script_steps, config.rand_seed);
        Ok(Self {
            catalog,
            registry,
            timers: TimerBank::new(),
            indicators: IndicatorBank::new(),
            switches: core::array::from_fn(|_| SwitchDebouncer::new(config.debounce_ms)),
            runtime,
            queue: DispatchQueue::new(),
            config,
            now_ms: 0,
            halted: false,
        })
    }

    /// Load a catalog and an instance config from their JSON text.
    pub fn from_sources(catalog_json: &str, instance_json: &str, config: EngineConfig) -> Result<Self> {
        let catalog = Catalog::from_json(catalog_json)?;
        let instance = provision::parse_instance_config(instance_json)?;
        let mut registry = Registry::new();
        instance.provision(&catalog, &mut registry);
        let program = Program::build(instance.scripts, &catalog)?;
        Self::new(catalog, registry, program, config)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Run `init` once. Whatever it raises is drained by the first cycle.
    pub fn start(&mut self, console: &mut impl ConsolePort, sink: &mut impl EventSink) {
        self.execute(Dispatch::new(ScriptBinding::Init), console, sink);
        let devices = self.registry.iter().count();
        let blocks = self.runtime.program().len();
        info!("SimService started: {} script blocks, {} devices", blocks, devices);
        sink.emit(&AppEvent::Started { blocks, devices });
    }

    /// Clear scopes, timers, indicators and pending dispatches, then run
    /// `init` again. Device state and lever positions are kept.
    pub fn restart(&mut self, console: &mut impl ConsolePort, sink: &mut impl EventSink) {
        self.runtime.reset();
        self.timers.cancel_all();
        self.indicators.clear_all();
        self.queue.clear();
        let discarded = self.registry.take_changes();
        if !discarded.is_empty() {
            debug!("SimService: {} pending condition changes discarded", discarded.len());
        }
        self.halted = false;
        info!("SimService restarting");
        sink.emit(&AppEvent::Restarted);
        self.execute(Dispatch::new(ScriptBinding::Init), console, sink);
    }

    // ── Per-cycle orchestration ───────────────────────────────

    /// Advance the simulation by `elapsed_ms`. A no-op while halted.
    ///
    /// The `io` parameter satisfies **both** [`SwitchPort`] and
    /// [`ConsolePort`], which avoids a double mutable borrow while keeping
    /// the port boundary explicit.
    pub fn cycle(&mut self, elapsed_ms: u32, io: &mut (impl SwitchPort + ConsolePort), sink: &mut impl EventSink) {
        if self.halted {
            return;
        }
        self.now_ms += u64::from(elapsed_ms);

        // 1. Indicators and timers
        self.indicators.tick(elapsed_ms);
        let mut expired = DispatchQueue::new();
        self.timers.tick(elapsed_ms, &mut expired);
        while let Some(dispatch) = expired.pop() {
            self.execute(dispatch, io, sink);
        }

        // 2. Switch edges
        for switch in 1..=SWITCH_COUNT {
            let raw = io.read_switch(switch);
            let debouncer = &mut self.switches[usize::from(switch) - 1];
            if let Some(position) = debouncer.update(raw, self.now_ms) {
                debug!("Switch {} -> {}", switch, position);
                sink.emit(&AppEvent::SwitchChanged { switch, position });
                let binding = ScriptBinding::SwitchEdge { switch, edge: position };
                self.execute(Dispatch::new(binding), io, sink);
            }
        }

        // 3. Condition changes from outside any script
        self.collect_changes(sink);

        // 4. Breadth-first drain
        let mut budget = self.config.max_dispatch_per_cycle;
        while budget > 0 {
            let Some(dispatch) = self.queue.pop() else {
                break;
            };
            self.execute(dispatch, io, sink);
            budget -= 1;
        }
        if !self.queue.is_empty() {
            let pending = self.queue.len();
            debug!("SimService: {} dispatches carried over", pending);
            sink.emit(&AppEvent::DispatchDeferred { pending });
        }
    }

    /// Run one dispatch, then queue the triggers and user events it caused.
    fn execute(&mut self, dispatch: Dispatch, console: &mut dyn ConsolePort, sink: &mut impl EventSink) {
        if let ScriptBinding::Trigger(slot) = dispatch.binding {
            sink.emit(&AppEvent::TriggerFired { slot });
        }
        let mut machine = Machine {
            registry: &mut self.registry,
            timers: &mut self.timers,
            indicators: &mut self.indicators,
            console,
            now_ms: self.now_ms,
            this: dispatch.this,
            raised: Vec::new(),
        };
        let outcome = self.runtime.run(&dispatch.binding, &mut machine);
        let raised = machine.raised;
        if let Err(e) = outcome {
            warn!("Script {} aborted: {}", dispatch.binding, e);
            sink.emit(&AppEvent::ScriptFault {
                binding: dispatch.binding.to_string(),
                reason: e.to_string(),
            });
        }
        self.collect_changes(sink);
        for n in raised {
            self.enqueue(Dispatch::new(ScriptBinding::UserEvent(n)), sink);
        }
    }

    fn collect_changes(&mut self, sink: &mut impl EventSink) {
        for slot in self.registry.take_changes() {
            let condition = match self.registry.get(slot.kind, u32::from(slot.address)) {
                Ok(dev) => dev.condition(),
                Err(_) => continue,
            };
            sink.emit(&AppEvent::ConditionChanged { slot, condition });
            let binding = ScriptBinding::Trigger(slot);
            if self.runtime.has(&binding) {
                self.enqueue(Dispatch::on_device(binding, slot), sink);
            }
        }
    }

    fn enqueue(&mut self, dispatch: Dispatch, sink: &mut impl EventSink) {
        let binding = dispatch.binding.to_string();
        if !self.queue.push(dispatch) {
            sink.emit(&AppEvent::DispatchDropped { binding });
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process an external command. Only [`ControlCommand::Poll`] yields
    /// pulses; registry errors are returned to the caller and change
    /// nothing.
    pub fn handle_command(
        &mut self,
        cmd: ControlCommand,
        console: &mut impl ConsolePort,
        sink: &mut impl EventSink,
    ) -> Result<Option<Pulses>> {
        match cmd {
            ControlCommand::Enable { kind, address } => self.registry.set_enabled(kind, address, true)?,
            ControlCommand::Disable { kind, address } => self.registry.set_enabled(kind, address, false)?,
            ControlCommand::SetAlarm { kind, address, level } => {
                self.registry.set_alarm(kind, address, level, false)?;
                self.collect_changes(sink);
            }
            ControlCommand::SetTrouble { kind, address, level } => {
                self.registry.set_trouble(kind, address, level, false)?;
                self.collect_changes(sink);
            }
            ControlCommand::SetRemoteTest { kind, address, on } => {
                self.registry.set_remote_test(kind, address, on, false)?;
                self.collect_changes(sink);
            }
            ControlCommand::Stop => {
                if !self.halted {
                    self.halted = true;
                    info!("SimService halted");
                    sink.emit(&AppEvent::Halted);
                }
            }
            ControlCommand::Resume => {
                if self.halted {
                    self.halted = false;
                    info!("SimService resumed");
                    sink.emit(&AppEvent::Resumed);
                }
            }
            ControlCommand::Restart => self.restart(console, sink),
            ControlCommand::RaiseUser { event: n } => {
                if !(1..=USER_EVENTS).contains(&n) {
                    return Err(ScriptError::Fault(Fault::BadArguments("usr")).into());
                }
                self.enqueue(Dispatch::new(ScriptBinding::UserEvent(n)), sink);
            }
            ControlCommand::Poll { kind, address, ctl } => {
                return Ok(self.poll(kind, address, ctl, console, sink));
            }
            ControlCommand::ReportPulses { kind, address, pulses } => {
                self.report_pulses(kind, address, &pulses, sink)?;
            }
        }
        Ok(None)
    }

    // ── Polling ───────────────────────────────────────────────

    /// Answer a poll from the loop master. `None` when the device is
    /// absent or disabled.
    pub fn poll(
        &mut self,
        kind: DeviceKind,
        address: u32,
        ctl: u8,
        console: &mut impl ConsolePort,
        sink: &mut impl EventSink,
    ) -> Option<Pulses> {
        let record = self.registry.record_poll(kind, address, ctl)?;
        let dev = self.registry.get_mut(kind, address).ok()?;
        let slot = dev.slot();
        let matched = record.command.and_then(|index| {
            let cmd = dev.model.commands.get(index)?;
            let binding = ScriptBinding::Command {
                kind,
                model: dev.model.name.clone(),
                index,
            };
            Some((binding, cmd.tag.clone()))
        });

        let command = match matched {
            Some((binding, tag)) if !self.halted => {
                debug!("Poll {}: ctl {:03b} matched '{}'", slot, ctl, tag);
                self.execute(Dispatch::on_device(binding, slot), console, sink);
                Some(tag)
            }
            _ => {
                dev.led = ctl & CTL_LED != 0;
                None
            }
        };

        let pulses = self.registry.get(kind, address).ok()?.pulses();
        sink.emit(&AppEvent::PollAnswered {
            slot,
            ctl,
            pulses,
            command,
        });
        Some(pulses)
    }

    /// Pulse feedback from the loop: decode and adopt the condition.
    pub fn report_pulses(
        &mut self,
        kind: DeviceKind,
        address: u32,
        pulses: &Pulses,
        sink: &mut impl EventSink,
    ) -> core::result::Result<Condition, RegistryError> {
        let condition = self.registry.apply_pulses(kind, address, pulses)?;
        self.collect_changes(sink);
        Ok(condition)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            halted: self.halted,
            time_ms: self.now_ms,
            devices: self.registry.snapshot(),
            indicators: self.indicators.states(),
            pending_dispatches: self.queue.len(),
            dropped_dispatches: self.queue.dropped(),
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn indicators(&self) -> &IndicatorBank {
        &self.indicators
    }

    pub fn timers(&self) -> &TimerBank {
        &self.timers
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn slot_condition(&self, slot: SlotRef) -> Option<Condition> {
        self.registry
            .get(slot.kind, u32::from(slot.address))
            .ok()
            .map(|d| d.condition())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
