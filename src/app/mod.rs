//! Application core: pure simulation logic, zero I/O.
//!
//! This module holds the scheduler of the simulator: the cycle that turns
//! timer expiries, switch edges and condition changes into script
//! dispatches, plus the control surface used by the host.  All
//! interaction with the outside world happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without a
//! terminal or a real loop master.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
