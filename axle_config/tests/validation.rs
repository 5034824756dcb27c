use axle_config::{Config, load_toml};
use rstest::rstest;

#[test]
fn empty_config_uses_defaults_and_validates() {
    let cfg = load_toml("").unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.pins.control, 18);
    assert_eq!(cfg.pins.sensor, 21);
    assert_eq!(cfg.controller.base_kick, 4);
    assert_eq!(cfg.encoder.pulses_per_rotation, 45.0);
}

#[test]
fn full_config_round_trips() {
    let cfg = load_toml(
        r#"
[pins]
control = 13
sensor = 19
sensor_id = 2

[controller]
update_rate_ms = 50
base_kick = 9
high_kp = 3.0

[encoder]
pulses_per_rotation = 90.0
filter_alpha = 0.6

[plant]
rpm_per_duty = 1.2

[logging]
file = "axle.log"
level = "debug"
rotation = "daily"
"#,
    )
    .unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.pins.control, 13);
    assert_eq!(cfg.pins.sensor_id, 2);
    assert_eq!(cfg.controller.update_rate_ms, 50);
    assert_eq!(cfg.controller.base_kick, 9);
    assert_eq!(cfg.controller.high_kp, 3.0);
    // Untouched fields keep their defaults.
    assert_eq!(cfg.controller.low_kp, 0.35);
    assert_eq!(cfg.encoder.pulses_per_rotation, 90.0);
    assert_eq!(cfg.encoder.filter_alpha, 0.6);
    assert_eq!(cfg.plant.rpm_per_duty, 1.2);
    assert_eq!(cfg.logging.file.as_deref(), Some("axle.log"));
}

#[rstest]
#[case("[pins]\ncontrol = 28", "pins")]
#[case("[pins]\ncontrol = 21\nsensor = 21", "differ")]
#[case("[controller]\nupdate_rate_ms = 0", "update_rate_ms")]
#[case("[controller]\npwm_frequency_hz = 8001", "pwm_frequency_hz")]
#[case("[controller]\nhigh_kp = -1.0", "gains")]
#[case("[controller]\nintegral_limit = 0.0", "integral_limit")]
#[case("[encoder]\nfilter_alpha = 0.0", "filter_alpha")]
#[case("[encoder]\npulses_per_rotation = 0.0", "pulses_per_rotation")]
#[case("[encoder]\nmin_window_us = 2000000", "min_window_us")]
#[case("[plant]\ntau_s = 0.0", "tau_s")]
fn out_of_range_values_fail_validation(#[case] toml: &str, #[case] needle: &str) {
    let cfg = load_toml(toml).unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains(needle), "got: {err}");
}

#[test]
fn unparsable_toml_is_a_parse_error() {
    assert!(load_toml("controller = 3").is_err());
    assert!(load_toml("[controller\nupdate_rate_ms = 1").is_err());
}

#[test]
fn unknown_keys_are_tolerated() {
    // Forward compatibility: older binaries ignore newer sections.
    let cfg: Config = load_toml("[future_section]\nx = 1").unwrap();
    cfg.validate().unwrap();
}
