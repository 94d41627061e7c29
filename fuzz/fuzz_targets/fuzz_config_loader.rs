#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary TOML must either fail to parse or validate without panicking,
// and a validated config must map onto the runtime structs.
fuzz_target!(|data: &str| {
    if let Ok(cfg) = weigher_config::load_toml(data)
        && cfg.validate().is_ok()
    {
        let acq = weigher_core::AcquisitionCfg::from(&cfg);
        assert!(acq.stability.window >= 1);
        assert!(acq.timing.max_unframed_bytes >= 11);
    }
});
