#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse errors and validation errors are fine; panics are not.
    if let Ok(cfg) = toml::from_str::<ailoop_config::Config>(data) {
        if cfg.validate().is_ok() {
            // Anything that validates must map onto the runtime config.
            let _ = ailoop_core::ModuleCfg::from(&cfg);
        }
    }
});
