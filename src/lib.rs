//! SLC device simulation engine.
//!
//! Simulates the addressable sensors and modules of a signalling loop:
//! a catalog of device models with their pulse-width answer tables, a
//! registry of provisioned instances, and an event-driven script runtime
//! that animates them from switches, timers and condition changes.
//!
//! ```text
//!  catalog.json ──▶ Catalog ─┐
//!                            ├──▶ Registry ──▶ codec ──▶ pulse answers
//!  config.json ──▶ provision ┤
//!                            └──▶ Program ──▶ Runtime
//!                                                │
//!  SwitchPort / ControlCommand ──▶ SimService ◀──┘ (timers, indicators)
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod catalog;
pub mod codec;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod json;
pub mod provision;
pub mod registry;
pub mod script;
pub mod timer;

pub use app::service::{SimService, Snapshot};
pub use error::{Error, Result};
