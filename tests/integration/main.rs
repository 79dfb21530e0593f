//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host with the sample
//! catalog and loop configuration from `demos/`.

mod catalog_tests;
mod mock_io;
mod provisioning_tests;
mod scenario_tests;
mod scheduler_tests;
