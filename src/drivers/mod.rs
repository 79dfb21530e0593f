//! Simulated panel peripherals: script indicators and lever switches.

pub mod indicator;
pub mod switch;
