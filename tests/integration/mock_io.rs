//! Mock panel and event recorder for integration tests.
//!
//! Records every console line and emitted event so tests can assert on
//! the full history without a terminal.

use slcsim::SimService;
use slcsim::app::events::AppEvent;
use slcsim::app::ports::{ConsolePort, EventSink, SwitchPort};
use slcsim::config::EngineConfig;
use slcsim::drivers::switch::SwitchPosition;

pub const CATALOG: &str = include_str!("../../demos/catalog.json");
pub const CONFIG: &str = include_str!("../../demos/config.json");
/// Hand-edited loop file in relaxed syntax (single quotes, loose commas).
#[allow(dead_code)]
pub const LEGACY_CONFIG: &str = include_str!("../../demos/cfg_test1.js");

// ── MockPanel ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockPanel {
    pub switches: [Option<SwitchPosition>; 2],
    pub console: String,
    pub reads: usize,
}

#[allow(dead_code)]
impl MockPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, switch: u8, position: SwitchPosition) {
        self.switches[usize::from(switch) - 1] = Some(position);
    }
}

impl SwitchPort for MockPanel {
    fn read_switch(&mut self, switch: u8) -> SwitchPosition {
        self.reads += 1;
        self.switches[usize::from(switch) - 1].unwrap_or(SwitchPosition::Off)
    }
}

impl ConsolePort for MockPanel {
    fn print(&mut self, text: &str) {
        self.console.push_str(text);
    }
}

// ── Recorder ──────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self, pred: impl Fn(&AppEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl EventSink for Recorder {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── Harness ───────────────────────────────────────────────────

pub struct Harness {
    pub sim: SimService,
    pub panel: MockPanel,
    pub sink: Recorder,
}

#[allow(dead_code)]
impl Harness {
    /// Load `config` against the demo catalog and run `init`.
    pub fn with_config(config: &str) -> Self {
        Self::with_engine(config, EngineConfig::default())
    }

    pub fn with_engine(config: &str, engine: EngineConfig) -> Self {
        let mut sim = SimService::from_sources(CATALOG, config, engine).expect("load");
        let mut panel = MockPanel::new();
        let mut sink = Recorder::new();
        sim.start(&mut panel, &mut sink);
        Self { sim, panel, sink }
    }

    pub fn demo() -> Self {
        Self::with_config(CONFIG)
    }

    pub fn cycle(&mut self) {
        let period = self.sim.config().cycle_period_ms;
        self.sim.cycle(period, &mut self.panel, &mut self.sink);
    }

    pub fn run_ms(&mut self, ms: u64) {
        let period = u64::from(self.sim.config().cycle_period_ms);
        for _ in 0..ms.div_ceil(period) {
            self.cycle();
        }
    }

    pub fn command(
        &mut self,
        cmd: slcsim::app::commands::ControlCommand,
    ) -> slcsim::Result<Option<slcsim::codec::Pulses>> {
        self.sim.handle_command(cmd, &mut self.panel, &mut self.sink)
    }
}
