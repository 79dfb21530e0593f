//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the `log` facade (stderr through `env_logger` in the host runner).

use log::{debug, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Started { blocks, devices } => {
                info!("START | blocks={} devices={}", blocks, devices);
            }
            AppEvent::Halted => info!("STATE | halted"),
            AppEvent::Resumed => info!("STATE | resumed"),
            AppEvent::Restarted => info!("STATE | restarted"),
            AppEvent::SwitchChanged { switch, position } => {
                info!("SWITCH | sw{} -> {}", switch, position);
            }
            AppEvent::ConditionChanged { slot, condition } => {
                info!("COND | {} -> {}", slot, condition);
            }
            AppEvent::TriggerFired { slot } => debug!("TRIG | {}", slot),
            AppEvent::ScriptFault { binding, reason } => {
                warn!("FAULT | {}: {}", binding, reason);
            }
            AppEvent::DispatchDeferred { pending } => {
                debug!("QUEUE | {} dispatches deferred", pending);
            }
            AppEvent::DispatchDropped { binding } => {
                warn!("QUEUE | dropped {}", binding);
            }
            AppEvent::PollAnswered {
                slot,
                ctl,
                pulses,
                command,
            } => {
                debug!(
                    "POLL | {} ctl={:03b} pw={:?} cmd={}",
                    slot,
                    ctl,
                    pulses,
                    command.as_deref().unwrap_or("-")
                );
            }
        }
    }
}
