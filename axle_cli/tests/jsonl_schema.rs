use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[pins]
control = 18
sensor = 21
sensor_id = 1

[plant]
rpm_per_duty = 0.8
tau_s = 0.1
"#;
    let path = dir.path().join("axle.toml");
    fs::write(&path, toml).unwrap();
    path
}

/// Validate the per-tick telemetry lines and the final summary line of a
/// short tracking run against the simulated drivetrain.
#[rstest]
fn track_jsonl_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("axle").unwrap();
    cmd.arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("track")
        .arg("--target-rpm")
        .arg("60")
        .arg("--seconds")
        .arg("1.5")
        // Ensure the sim drivetrain spins even if config defaults change.
        .env("AXLE_TEST_RPM_PER_DUTY", "0.8");

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);

    // Per-tick ControllerStatus lines.
    let ticks: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|l| l.contains("\"current_rpm\""))
        .map(|l| serde_json::from_str(l).expect("valid tick JSON"))
        .collect();
    assert!(ticks.len() >= 5, "expected tick telemetry, got:\n{stdout}");
    for tick in &ticks {
        assert_eq!(tick.get("active").and_then(|v| v.as_bool()), Some(true));
        assert_eq!(tick.get("target_rpm").and_then(|v| v.as_f64()), Some(60.0));
        assert!(tick.get("current_rpm").and_then(|v| v.as_f64()).is_some());
        assert!(tick.get("error").and_then(|v| v.as_f64()).is_some());
        let pwm = tick.get("current_pwm").and_then(|v| v.as_u64()).unwrap();
        assert!(pwm <= 255);
        assert_eq!(tick.get("control_pin").and_then(|v| v.as_u64()), Some(18));
        assert_eq!(tick.get("sensor_id").and_then(|v| v.as_u64()), Some(1));
        assert!(tick.get("wall_ms").and_then(|v| v.as_u64()).is_some());
    }

    // The plant actually spun up.
    let last_rpm = ticks
        .last()
        .and_then(|t| t.get("current_rpm"))
        .and_then(|v| v.as_f64())
        .unwrap();
    assert!(last_rpm > 5.0, "sim drivetrain never moved: {last_rpm}");

    // Summary line.
    let summary_line = stdout
        .lines()
        .find(|l| l.contains("\"final_rpm\""))
        .expect("summary line");
    let v: serde_json::Value = serde_json::from_str(summary_line).expect("valid summary JSON");
    assert_eq!(v.get("target_rpm").and_then(|x| x.as_f64()), Some(60.0));
    assert!(v.get("final_rpm").and_then(|x| x.as_f64()).is_some());
    assert!(v.get("ticks").and_then(|x| x.as_u64()).unwrap() >= 5);
    assert!(v.get("duration_ms").and_then(|x| x.as_u64()).is_some());
    assert_eq!(v.get("aborted").and_then(|x| x.as_bool()), Some(false));
}

/// With nothing driving the pin, monitor stays silent and still exits
/// cleanly.
#[rstest]
fn monitor_is_silent_without_motion() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("axle").unwrap();
    cmd.arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("monitor")
        .arg("--seconds")
        .arg("0.3");

    let out = cmd.assert().success().get_output().stdout.clone();
    let stdout = String::from_utf8_lossy(&out);
    assert!(
        !stdout.contains("pulse_count"),
        "unexpected pulse telemetry: {stdout}"
    );
}
