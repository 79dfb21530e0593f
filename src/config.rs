//! Engine configuration parameters.
//!
//! All tunable parameters of the simulation scheduler.  Every field has a
//! default, so a config file only needs the values it changes.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Scheduler tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Host loop period (milliseconds)
    pub cycle_period_ms: u32,
    /// Time a switch position must hold before its edge fires
    pub debounce_ms: u32,
    /// Dispatches run per cycle before the rest is carried over
    pub max_dispatch_per_cycle: usize,
    /// Statements one script invocation may execute
    pub max_script_steps: u32,
    /// Seed of the script `rand()` generator
    pub rand_seed: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: 10,
            debounce_ms: 50,
            max_dispatch_per_cycle: 64,
            max_script_steps: 100_000,
            rand_seed: 1,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError {
            field: "engine",
            message: e.to_string(),
        })
    }

    /// Every violated constraint; empty when the config is usable.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.cycle_period_ms == 0 {
            errors.push(ConfigError {
                field: "cycle_period_ms",
                message: "must be > 0".into(),
            });
        }
        if self.debounce_ms > 10_000 {
            errors.push(ConfigError {
                field: "debounce_ms",
                message: format!("must be <= 10000, got {}", self.debounce_ms),
            });
        }
        if self.max_dispatch_per_cycle == 0 {
            errors.push(ConfigError {
                field: "max_dispatch_per_cycle",
                message: "must be > 0".into(),
            });
        }
        if self.max_script_steps == 0 {
            errors.push(ConfigError {
                field: "max_script_steps",
                message: "must be > 0".into(),
            });
        }
        errors
    }
}
