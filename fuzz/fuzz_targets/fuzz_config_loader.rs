#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    // Parse and validation errors are fine; panics are not. Anything that
    // validates must also convert and pass the controller's own checks.
    let Ok(cfg) = blinds_config::load_toml(data) else {
        return;
    };
    if cfg.validate().is_err() {
        return;
    }
    let rt = blinds_core::ControllerCfg::from(&cfg);
    assert!(rt.travel.top > rt.travel.bottom);
    assert!(rt.motion.min_burst < 0 && rt.motion.max_burst > 0);
});
