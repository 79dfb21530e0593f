//! Fuzz target: catalog and instance configuration loaders
//!
//! Feeds arbitrary text to both JSON loaders. Malformed documents must be
//! rejected with an error; anything accepted must provision without
//! panicking.
//!
//! cargo fuzz run fuzz_catalog

#![no_main]

use libfuzzer_sys::fuzz_target;
use slcsim::catalog::Catalog;
use slcsim::provision::parse_instance_config;
use slcsim::registry::Registry;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let catalog = Catalog::from_json(text).unwrap_or_default();
    if let Ok(instance) = parse_instance_config(text) {
        let mut registry = Registry::new();
        let report = instance.provision(&catalog, &mut registry);
        assert!(registry.iter().count() <= report.provisioned);
    }
});
