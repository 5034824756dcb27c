use std::sync::{Arc, Mutex};

use axle_hardware::{SimBackend, detect_backend};
use axle_traits::{GpioBackend, Level};

#[test]
fn records_duty_writes_and_history() {
    let sim = SimBackend::new();
    let mut out = sim.open_output(18).expect("open output");

    out.set_frequency(1000).unwrap();
    out.write_duty(100).unwrap();
    out.write_duty(0).unwrap();

    assert_eq!(sim.duty(18), Some(0));
    assert_eq!(sim.frequency(18), Some(1000));
    assert_eq!(sim.duty_history(18), vec![100, 0]);
}

#[test]
fn history_survives_handle_release() {
    let sim = SimBackend::new();
    let mut out = sim.open_output(12).expect("open output");
    out.write_duty(42).unwrap();
    drop(out);

    assert!(!sim.output_open(12));
    assert_eq!(sim.duty(12), None);
    assert_eq!(sim.duty_history(12), vec![42]);
}

#[test]
fn rejects_double_open_on_same_pin() {
    let sim = SimBackend::new();
    let _out = sim.open_output(18).expect("first open");

    let err = sim.open_output(18).expect_err("second open must fail");
    assert!(err.to_string().contains("already open"), "got: {err}");

    // Input on an output-held pin is a conflict too.
    let err = sim
        .open_input(18, Box::new(|_, _| {}))
        .expect_err("input on held pin must fail");
    assert!(err.to_string().contains("already open"), "got: {err}");
}

#[test]
fn injected_edges_reach_the_callback_with_ticks() {
    let sim = SimBackend::new();
    let seen: Arc<Mutex<Vec<(Level, u64)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = seen.clone();
    let _input = sim
        .open_input(21, Box::new(move |level, tick| {
            seen_cb.lock().unwrap().push((level, tick));
        }))
        .expect("open input");

    assert!(sim.inject_edge_at(21, Level::High, 1_000));
    assert!(sim.inject_edge_at(21, Level::High, 9_000));
    assert!(sim.inject_edge(21, Level::Low));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0], (Level::High, 1_000));
    assert_eq!(seen[1], (Level::High, 9_000));
    assert_eq!(seen[2].0, Level::Low);
}

#[test]
fn dropping_the_input_stops_delivery() {
    let sim = SimBackend::new();
    let input = sim.open_input(22, Box::new(|_, _| {})).expect("open input");
    assert!(sim.input_open(22));

    drop(input);
    assert!(!sim.input_open(22));
    assert!(!sim.inject_edge_at(22, Level::High, 5_000));
}

#[test]
fn detect_falls_back_to_simulation_without_hardware() {
    // Without the `hardware` feature (or without the native driver) the
    // probe must hand back the simulation backend rather than fail.
    let backend = detect_backend();
    assert!(backend.simulated());
}
