use ailoop_config::load_toml;
use rstest::rstest;

#[test]
fn full_document_parses_and_validates() {
    let toml = r#"
[scheduler]
period_ms = 2

[filter]
window = 50
exp_coefficient = 0.25

[calibration]
settle_exchanges = 4
sample_count = 2000

[storage]
record_address = 4096
max_attempts = 500

[bus]
timeout_ticks = [10, 10, 10, 10, 40, 10]

[logging]
level = "debug"
rotation = "daily"

[simulation]
currents_ua = [4000.0, 8000.0, 12000.0, 16000.0, 20000.0, 2000.0]
spike_every = 7
responding_channels = [1, 4]
"#;

    let cfg = load_toml(toml).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.filter.window, 50);
    assert_eq!(cfg.storage.record_address, 4096);
    assert_eq!(cfg.bus.mux_codes, [0b011, 0b010, 0b000, 0b110, 0b101, 0b100]);
    assert_eq!(cfg.simulation.spike_every, Some(7));
    assert!((cfg.calibration.default_b - 1.146_119_922_916_554_4).abs() < 1e-15);
}

#[rstest]
#[case("[filter]\nwindow = 0", "filter.window must be in [1, 200]")]
#[case("[filter]\nwindow = 201", "filter.window must be in [1, 200]")]
#[case("[filter]\nexp_coefficient = 0.0", "filter.exp_coefficient")]
#[case("[filter]\nexp_coefficient = 1.5", "filter.exp_coefficient")]
#[case("[scheduler]\nperiod_ms = 0", "scheduler.period_ms must be >= 1")]
#[case("[calibration]\nsample_count = 0", "calibration.sample_count")]
#[case("[storage]\nmax_attempts = 0", "storage.max_attempts")]
#[case("[bus]\ntimeout_ticks = [30, 30, 0, 30, 120, 30]", "bus.timeout_ticks[2]")]
#[case("[bus]\nmux_codes = [3, 2, 0, 6, 5, 7]", "collides with bus.transmit_code")]
#[case("[bus]\nmux_codes = [3, 2, 0, 6, 5, 3]", "duplicates an earlier channel")]
#[case("[bus]\nmux_codes = [3, 2, 0, 6, 5, 9]", "must fit in 3 bits")]
#[case("[logging]\nrotation = \"weekly\"", "logging.rotation")]
#[case("[simulation]\ngain = [1.0, 1.0, 0.0, 1.0, 1.0, 1.0]", "simulation.gain")]
#[case("[simulation]\nresponding_channels = [6]", "simulation.responding_channels")]
fn rejects_out_of_range_values(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "expected '{needle}' in '{err}'"
    );
}

#[test]
fn unknown_types_fail_to_parse() {
    assert!(load_toml("[filter]\nwindow = \"wide\"").is_err());
    assert!(load_toml("[bus]\ntimeout_ticks = [1, 2]").is_err());
}
