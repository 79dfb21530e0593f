//! slcsim: host runner for the SLC device simulation engine.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HostPanel            LogEventSink      JsonLinesSink          │
//! │  (Switch+Console)     (EventSink)       (EventSink)            │
//! │  Stimulus timeline ── ControlCommand ─────────┐                │
//! │                                               ▼                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              SimService (pure logic)                   │    │
//! │  │  Registry · Timers · Indicators · Script runtime       │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};

use slcsim::SimService;
use slcsim::adapters::json_sink::JsonLinesSink;
use slcsim::adapters::log_sink::LogEventSink;
use slcsim::adapters::panel::{HostPanel, Stimulus, StimulusStep};
use slcsim::app::ports::EventSink;
use slcsim::config::EngineConfig;

#[derive(Parser)]
#[command(name = "slcsim", version, about = "SLC loop device simulator")]
struct Cli {
    /// Device catalog (JSON)
    #[arg(long)]
    catalog: PathBuf,

    /// Instance configuration: provisioning records and scripts (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Engine tunables (JSON); defaults apply when omitted
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Number of cycles to run
    #[arg(long, default_value_t = 1000)]
    cycles: u64,

    /// Simulated milliseconds per cycle; defaults to the engine cycle period
    #[arg(long)]
    tick_ms: Option<u32>,

    /// Timed switch positions and control commands (JSON array)
    #[arg(long)]
    stimulus: Option<PathBuf>,

    /// Print events as JSON lines on stdout instead of logging them
    #[arg(long)]
    json_events: bool,

    /// Print the final status snapshot as JSON
    #[arg(long)]
    status: bool,
}

fn read(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {what} {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    info!("slcsim v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Engine config ──────────────────────────────────────
    let engine = match &cli.engine {
        Some(path) => EngineConfig::from_json(&read(path, "engine config")?)
            .with_context(|| format!("parsing {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let tick_ms = cli.tick_ms.unwrap_or(engine.cycle_period_ms);
    if tick_ms == 0 {
        bail!("--tick-ms must be > 0");
    }

    // ── 2. Catalog, instances and scripts ─────────────────────
    let catalog = read(&cli.catalog, "catalog")?;
    let config = read(&cli.config, "instance config")?;
    let mut sim = SimService::from_sources(&catalog, &config, engine).context("loading simulation")?;

    let mut stimulus = match &cli.stimulus {
        Some(path) => {
            Stimulus::from_json(&read(path, "stimulus")?).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Stimulus::default(),
    };

    // ── 3. Adapters ───────────────────────────────────────────
    let mut panel = HostPanel::new(std::io::stdout());
    let mut sink: Box<dyn EventSink> = if cli.json_events {
        Box::new(JsonLinesSink::new(std::io::stdout()))
    } else {
        Box::new(LogEventSink::new())
    };

    sim.start(&mut panel, &mut sink);

    // ── 4. Cycle loop ─────────────────────────────────────────
    // The stimulus follows host time, which keeps running while halted.
    let mut host_ms = 0u64;
    for _ in 0..cli.cycles {
        host_ms += u64::from(tick_ms);
        for step in stimulus.due(host_ms).to_vec() {
            match step {
                StimulusStep::Switch { switch, position, .. } => {
                    panel.set_switch(switch, position);
                }
                StimulusStep::Command { command, .. } => {
                    match sim.handle_command(command, &mut panel, &mut sink) {
                        Ok(Some(pulses)) => info!("Poll answer: {:?}", pulses),
                        Ok(None) => {}
                        Err(e) => warn!("Command rejected: {}", e),
                    }
                }
            }
        }
        sim.cycle(tick_ms, &mut panel, &mut sink);
    }
    info!(
        "Ran {} cycles: {} ms host time, {} ms simulated",
        cli.cycles,
        host_ms,
        sim.now_ms()
    );
    if !stimulus.is_finished() {
        warn!("Stimulus steps after {} ms were not reached", host_ms);
    }

    // ── 5. Status ─────────────────────────────────────────────
    if cli.status {
        let snapshot = serde_json::to_string_pretty(&sim.snapshot()).context("serializing status")?;
        println!("{snapshot}");
    }
    Ok(())
}
